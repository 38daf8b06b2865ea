//! Command-line definitions.

use busreminder_core::RecurrenceMode;
use clap::{Parser, Subcommand};

/// Departure reminders for favorite bus trips.
#[derive(Parser, Debug)]
#[command(name = "busreminder")]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to $BUSREMINDER_CONFIG, then ~/.busreminder/busreminder.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the reminder daemon in the foreground
    Run,

    /// Manage favorite departures
    Favorites {
        #[command(subcommand)]
        command: FavoritesCommand,
    },

    /// Change recurrence and quiet settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },

    /// Print the next reminder for every active favorite without registering anything
    Preview,
}

#[derive(Subcommand, Debug)]
pub enum FavoritesCommand {
    /// Add a favorite departure
    Add {
        /// Route identifier used for per-route settings
        route: String,

        /// Departure time, HH:MM local
        time: String,

        /// Weekday the favorite was saved for (1 = Sunday ... 7 = Saturday); defaults to today
        #[arg(long)]
        weekday: Option<u8>,

        /// Explicit id; a fresh UUID is used otherwise
        #[arg(long)]
        id: Option<String>,

        /// Display name for the route
        #[arg(long)]
        route_name: Option<String>,

        /// Display name for the stop
        #[arg(long)]
        stop_name: Option<String>,
    },

    /// List all favorites
    List,

    /// Delete a favorite
    Remove { id: String },

    /// Resume reminders for a favorite
    Activate { id: String },

    /// Pause reminders for a favorite
    Deactivate { id: String },
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// Set the global recurrence mode (all_days, weekdays, selected_days, disabled)
    Global { mode: RecurrenceMode },

    /// Override the recurrence mode for one route
    Route {
        route_id: String,

        /// New mode; omit together with --clear to fall back to the global policy
        #[arg(required_unless_present = "clear")]
        mode: Option<RecurrenceMode>,

        /// Remove the override
        #[arg(long, conflicts_with = "mode")]
        clear: bool,
    },

    /// Set the day list used by selected_days, e.g. "2,4" for Monday and Wednesday
    Days {
        /// Comma-separated weekday numbers, 1 = Sunday ... 7 = Saturday
        days: String,

        /// Apply to this route's override instead of the global policy
        #[arg(long)]
        route: Option<String>,
    },

    /// Mute, snooze, or resume all reminders
    Quiet {
        #[command(subcommand)]
        command: QuietCommand,
    },

    /// Print current settings
    Show,
}

#[derive(Subcommand, Debug)]
pub enum QuietCommand {
    /// Deliver reminders normally
    Resume,
    /// Suppress reminders until resumed
    Mute,
    /// Suppress reminders for a number of minutes
    Snooze { minutes: u32 },
}
