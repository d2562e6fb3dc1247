mod paths;

pub use paths::{AppPaths, AppPathsError, BaseDir};
