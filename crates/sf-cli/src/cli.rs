//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Pomodoro focus timer with a distraction gate.
///
/// Alternates work and rest phases from wall-clock timestamps, so a
/// session survives the daemon being restarted or the machine sleeping.
#[derive(Debug, Parser)]
#[command(name = "sf", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the background timer authority.
    Daemon,

    /// Start a work (or rest) phase, replacing any current session.
    Start(StartArgs),

    /// Pause the running phase.
    Pause,

    /// Resume the paused phase.
    Resume,

    /// Pause if running, resume if paused, start work if idle.
    Toggle,

    /// Stop the work/rest cycle.
    Stop,

    /// Show the current session.
    Status {
        /// Print the raw state snapshot as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Follow the timer and print prompts as they arrive.
    Watch,

    /// Manage the work-domain list.
    #[command(subcommand)]
    Domains(DomainsAction),

    /// Report a browser tab event to the distraction gate.
    Tab {
        /// URL the tab is showing.
        url: String,

        /// Browser tab identifier.
        #[arg(long, default_value_t = 0)]
        tab_id: u64,

        /// Report a finished page load instead of a tab switch.
        #[arg(long)]
        completed: bool,

        /// The tab is not in the foreground (only relevant with --completed).
        #[arg(long)]
        background: bool,
    },

    /// Answer a distraction prompt.
    #[command(subcommand)]
    Classify(ClassifyAction),

    /// Show or change timer settings.
    Settings(SettingsArgs),

    /// Show or change the distraction gate flags.
    Gating(GatingArgs),

    /// Ask the study assistant a question.
    Ask {
        /// The question, as one or more words.
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },

    /// Store the Gemini API key used by the study assistant.
    ApiKey {
        /// The key. An empty string removes it.
        key: String,
    },
}

#[derive(Debug, Args)]
pub struct StartArgs {
    /// Start a rest phase instead of work.
    #[arg(long)]
    pub rest: bool,

    /// Phase length in minutes.
    #[arg(long, conflicts_with = "seconds")]
    pub minutes: Option<u64>,

    /// Phase length in seconds (at least 10).
    #[arg(long)]
    pub seconds: Option<u64>,
}

impl StartArgs {
    /// Requested duration in seconds, if any was given.
    pub fn duration_seconds(&self) -> Option<u64> {
        self.seconds
            .or_else(|| self.minutes.map(|minutes| minutes.saturating_mul(60)))
    }
}

/// Work-domain subcommands.
#[derive(Debug, Subcommand)]
pub enum DomainsAction {
    /// List work domains.
    List,
    /// Add a work domain (hostname or URL).
    Add { domain: String },
    /// Remove a work domain.
    Remove { domain: String },
    /// Remove every work domain.
    Clear,
}

/// Answers to a distraction prompt.
#[derive(Debug, Subcommand)]
pub enum ClassifyAction {
    /// The site is work: add it to the list.
    Work {
        domain: String,
        #[arg(long)]
        tab_id: Option<u64>,
    },
    /// The site is a distraction: close the tab.
    Reject {
        #[arg(long)]
        tab_id: Option<u64>,
    },
}

#[derive(Debug, Args)]
pub struct SettingsArgs {
    /// Work phase length in minutes.
    #[arg(long)]
    pub work_minutes: Option<u64>,

    /// Rest phase length in minutes.
    #[arg(long)]
    pub rest_minutes: Option<u64>,

    /// Enable or disable completion notifications.
    #[arg(long)]
    pub notifications: Option<bool>,
}

impl SettingsArgs {
    pub const fn is_empty(&self) -> bool {
        self.work_minutes.is_none() && self.rest_minutes.is_none() && self.notifications.is_none()
    }
}

#[derive(Debug, Args)]
pub struct GatingArgs {
    /// Turn the distraction gate on.
    #[arg(long, conflicts_with = "disable")]
    pub enable: bool,

    /// Turn the distraction gate off entirely.
    #[arg(long)]
    pub disable: bool,

    /// Gating mode; `normal` never prompts.
    #[arg(long)]
    pub mode: Option<String>,
}

impl GatingArgs {
    pub const fn extension_enabled(&self) -> Option<bool> {
        if self.enable {
            Some(true)
        } else if self.disable {
            Some(false)
        } else {
            None
        }
    }
}
