//! Shows or updates timer settings.

use std::io::Write;

use anyhow::Result;
use sf_core::Request;

use super::status::open_existing;
use super::util::{expect_settings, render_settings};
use crate::client::{self, DaemonClient};
use crate::{Config, SettingsArgs};

pub fn run<W: Write>(writer: &mut W, config: &Config, args: &SettingsArgs) -> Result<()> {
    if args.is_empty() {
        return show(writer, config);
    }
    let mut daemon = client::connect(&config.socket_path)?;
    let (mut settings, _) = expect_settings(daemon.call(&Request::GetSettings)?)?;
    if let Some(minutes) = args.work_minutes {
        settings.work_duration_seconds = minutes.saturating_mul(60);
    }
    if let Some(minutes) = args.rest_minutes {
        settings.rest_duration_seconds = minutes.saturating_mul(60);
    }
    if let Some(enabled) = args.notifications {
        settings.notifications_enabled = enabled;
    }
    let (settings, gating) = expect_settings(daemon.call(&Request::UpdateSettings { settings })?)?;
    render_settings(writer, &settings, &gating)?;
    Ok(())
}

fn show<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let (settings, gating) = match DaemonClient::connect(&config.socket_path) {
        Ok(mut daemon) => expect_settings(daemon.call(&Request::GetSettings)?)?,
        Err(_) => {
            let db = open_existing(config)?;
            (db.timer_settings()?, db.gating_config()?)
        }
    };
    render_settings(writer, &settings, &gating)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::commands::test_support::{TestDaemon, test_config};

    #[test]
    fn defaults_without_daemon() {
        let temp = tempfile::tempdir().unwrap();
        let config = test_config(temp.path());
        let args = SettingsArgs {
            work_minutes: None,
            rest_minutes: None,
            notifications: None,
        };

        let mut output = Vec::new();
        run(&mut output, &config, &args).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Work: 25:00
        Rest: 5:00
        Notifications: on
        Gating: on (focus mode)
        ");
    }

    #[test]
    fn update_keeps_unspecified_fields() {
        let temp = tempfile::tempdir().unwrap();
        let config = test_config(temp.path());
        let _daemon = TestDaemon::spawn(&config);
        let args = SettingsArgs {
            work_minutes: Some(50),
            rest_minutes: None,
            notifications: Some(false),
        };

        let mut output = Vec::new();
        run(&mut output, &config, &args).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Work: 50:00
        Rest: 5:00
        Notifications: off
        Gating: on (focus mode)
        ");
    }

    #[test]
    fn zero_minutes_is_raised_to_the_floor() {
        let temp = tempfile::tempdir().unwrap();
        let config = test_config(temp.path());
        let _daemon = TestDaemon::spawn(&config);
        let args = SettingsArgs {
            work_minutes: None,
            rest_minutes: Some(0),
            notifications: None,
        };

        let mut output = Vec::new();
        run(&mut output, &config, &args).unwrap();
        assert!(String::from_utf8(output).unwrap().contains("Rest: 0:10"));
    }
}
