use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "correcteur",
    version,
    about = "Correction orthographique et grammaticale de textes en français"
)]
pub struct Cli {
    /// Enable debug logging for this run.
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check for, download and install application updates.
    #[command(subcommand)]
    Update(UpdateCommand),
    /// Correct a text. Reads stdin when TEXT is absent or `-`.
    Correct {
        /// Category id giving the correction its context.
        #[arg(long)]
        category: Option<String>,
        text: Option<String>,
    },
    /// Manage the completion API key.
    #[command(subcommand)]
    Key(KeyCommand),
    /// Choose the completion model.
    #[command(subcommand)]
    Model(ModelCommand),
    /// Manage correction categories.
    #[command(subcommand)]
    Category(CategoryCommand),
    /// Show past corrections, newest first.
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Show correction statistics and personalized tips.
    Stats,
    /// Clear history and/or statistics. Clears both when no flag is given.
    Reset {
        #[arg(long)]
        history: bool,
        #[arg(long)]
        statistics: bool,
    },
    /// List published releases.
    Releases,
}

#[derive(Debug, Subcommand)]
pub enum UpdateCommand {
    Check,
    Install {
        /// Do not ask for confirmation.
        #[arg(long, short)]
        yes: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum KeyCommand {
    /// Validate and store a key.
    Set { key: String },
    /// Validate the given key, or the stored one.
    Validate { key: Option<String> },
}

#[derive(Debug, Subcommand)]
pub enum ModelCommand {
    Set { model: String },
    Show,
}

#[derive(Debug, Subcommand)]
pub enum CategoryCommand {
    List,
    Add {
        name: String,
        #[arg(long)]
        preprompt: String,
        #[arg(long)]
        icon: Option<String>,
    },
    /// Change the name, preprompt or icon of a category.
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        preprompt: Option<String>,
        #[arg(long)]
        icon: Option<String>,
    },
    Remove {
        id: String,
    },
    Enable {
        id: String,
    },
    Disable {
        id: String,
    },
}
