//! One-shot CLI commands. They write to the database and exit; a running
//! daemon picks the changes up on its next periodic resync.

use std::sync::Arc;

use anyhow::Context;
use busreminder_core::config::ReminderConfig;
use busreminder_core::types::weekday_number;
use busreminder_core::{DaySet, FavoriteDeparture, FavoriteId, PolicyScope, QuietSuppression};
use busreminder_scheduler::{
    compute, Clock, RecurrencePreferencesCache, SettingsStore, SettingsUpdate, SystemClock,
};
use busreminder_store::{SqliteFavoritesStore, SqliteSettingsStore};
use chrono::{Datelike, Duration, Local, Utc};

use crate::cli::{FavoritesCommand, QuietCommand, SettingsCommand};
use crate::open_db;

pub fn favorites(command: FavoritesCommand, config: &ReminderConfig) -> anyhow::Result<()> {
    let store = SqliteFavoritesStore::new(open_db(&config.database.path)?)?;

    match command {
        FavoritesCommand::Add {
            route,
            time,
            weekday,
            id,
            route_name,
            stop_name,
        } => {
            let id = id.unwrap_or_else(|| uuid::Uuid::now_v7().to_string());
            let weekday = weekday.unwrap_or_else(|| weekday_number(Local::now().weekday()));
            let mut favorite = FavoriteDeparture::new(id, route, time, weekday);
            favorite.route_name = route_name;
            favorite.stop_name = stop_name;
            // Reject obviously bad input here; the store itself accepts anything.
            favorite.validate().context("invalid favorite")?;
            store.add(&favorite)?;
            println!("added {}", favorite.id);
        }
        FavoritesCommand::List => {
            let all = store.list()?;
            if all.is_empty() {
                println!("no favorites");
            }
            for f in all {
                println!(
                    "{}  {:<12} {}  day={}  {}{}",
                    f.id,
                    f.route_label(),
                    f.departure_time,
                    f.base_weekday,
                    if f.is_active { "active" } else { "paused" },
                    f.stop_name
                        .as_deref()
                        .map(|s| format!("  @ {s}"))
                        .unwrap_or_default(),
                );
            }
        }
        FavoritesCommand::Remove { id } => {
            store.remove(&FavoriteId::from(id.as_str()))?;
            println!("removed {id}");
        }
        FavoritesCommand::Activate { id } => {
            store.set_active(&FavoriteId::from(id.as_str()), true)?;
            println!("activated {id}");
        }
        FavoritesCommand::Deactivate { id } => {
            store.set_active(&FavoriteId::from(id.as_str()), false)?;
            println!("deactivated {id}");
        }
    }
    Ok(())
}

pub async fn settings(command: SettingsCommand, config: &ReminderConfig) -> anyhow::Result<()> {
    let store = SqliteSettingsStore::new(open_db(&config.database.path)?)?;

    let update = match command {
        SettingsCommand::Global { mode } => SettingsUpdate::GlobalMode(mode),
        SettingsCommand::Route {
            route_id,
            mode,
            clear,
        } => SettingsUpdate::RouteMode {
            route_id,
            mode: if clear { None } else { mode },
        },
        SettingsCommand::Days { days, route } => SettingsUpdate::SelectedDays {
            scope: route.map_or(PolicyScope::Global, PolicyScope::Route),
            days: DaySet::parse_numbers(&days).map_err(anyhow::Error::msg)?,
        },
        SettingsCommand::Quiet { command } => SettingsUpdate::Quiet(match command {
            QuietCommand::Resume => QuietSuppression::Enabled,
            QuietCommand::Mute => QuietSuppression::Disabled,
            QuietCommand::Snooze { minutes } => QuietSuppression::SuppressedUntil {
                until: Utc::now() + Duration::minutes(i64::from(minutes)),
            },
        }),
        SettingsCommand::Show => return show_settings(&store).await,
    };

    update.write_to(&store).await?;
    println!("saved: {update:?}");
    Ok(())
}

async fn show_settings(store: &SqliteSettingsStore) -> anyhow::Result<()> {
    println!("global: {}", store.global_mode().await?);
    println!("global days: {}", store.selected_days(&PolicyScope::Global).await?);
    for route_id in store.routes_with_overrides().await? {
        let mode = store
            .route_mode(&route_id)
            .await?
            .map(|m| m.to_string())
            .unwrap_or_default();
        let days = store
            .selected_days(&PolicyScope::Route(route_id.clone()))
            .await?;
        println!("route {route_id}: {mode} (days: {days})");
    }
    let quiet = store.quiet_suppression().await?;
    let now = Utc::now();
    match quiet.effective_at(now) {
        QuietSuppression::Enabled => println!("reminders: on"),
        QuietSuppression::Disabled => println!("reminders: muted"),
        QuietSuppression::SuppressedUntil { until } => {
            println!("reminders: snoozed until {}", until.with_timezone(&Local))
        }
    }
    Ok(())
}

/// Print what the daemon would register for each active favorite right now.
pub async fn preview(config: &ReminderConfig) -> anyhow::Result<()> {
    let settings = Arc::new(SqliteSettingsStore::new(open_db(&config.database.path)?)?);
    let favorites = SqliteFavoritesStore::new(open_db(&config.database.path)?)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = RecurrencePreferencesCache::new(settings, Arc::clone(&clock));
    cache.refresh().await?;

    let lead = config.engine.lead_time();
    let now = clock.now().with_timezone(&Local);
    let active: Vec<FavoriteDeparture> = favorites.list()?.into_iter().filter(|f| f.is_active).collect();
    if active.is_empty() {
        println!("no active favorites");
    }
    for f in active {
        let policy = cache.policy(&f.route_id);
        match compute(&f.departure_time, f.base_weekday, &policy, &now) {
            Ok(departure) => {
                let fire_at = departure.clone() - lead;
                let note = if fire_at <= now { "  (too soon, not registered)" } else { "" };
                println!(
                    "{}  {:<12} departs {}  reminder {}{}",
                    f.id,
                    f.route_label(),
                    departure.format("%a %Y-%m-%d %H:%M"),
                    fire_at.format("%a %H:%M"),
                    note,
                );
            }
            Err(reason) => println!("{}  {:<12} nothing scheduled: {reason}", f.id, f.route_label()),
        }
    }
    Ok(())
}
