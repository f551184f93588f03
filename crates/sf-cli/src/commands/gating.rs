//! Shows or changes the distraction gate flags.

use std::io::Write;

use anyhow::Result;
use sf_core::Request;

use super::util::{expect_settings, render_settings};
use crate::client;
use crate::{Config, GatingArgs};

pub fn run<W: Write>(writer: &mut W, config: &Config, args: &GatingArgs) -> Result<()> {
    let request = match (args.extension_enabled(), &args.mode) {
        (None, None) => Request::GetSettings,
        (extension_enabled, mode) => Request::SetGating {
            extension_enabled,
            mode: mode.clone(),
        },
    };
    let mut daemon = client::connect(&config.socket_path)?;
    let (settings, gating) = expect_settings(daemon.call(&request)?)?;
    render_settings(writer, &settings, &gating)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{TestDaemon, test_config};

    fn gating_line(config: &Config, args: &GatingArgs) -> String {
        let mut output = Vec::new();
        run(&mut output, config, args).unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .find(|line| line.starts_with("Gating:"))
            .unwrap()
            .to_string()
    }

    #[test]
    fn mode_and_enable_flags() {
        let temp = tempfile::tempdir().unwrap();
        let config = test_config(temp.path());
        let _daemon = TestDaemon::spawn(&config);

        let normal = GatingArgs {
            enable: false,
            disable: false,
            mode: Some("Normal".to_string()),
        };
        assert_eq!(gating_line(&config, &normal), "Gating: off (normal mode)");

        let disabled = GatingArgs {
            enable: false,
            disable: true,
            mode: Some("focus".to_string()),
        };
        assert_eq!(gating_line(&config, &disabled), "Gating: off");

        let enabled = GatingArgs {
            enable: true,
            disable: false,
            mode: None,
        };
        assert_eq!(gating_line(&config, &enabled), "Gating: on (focus mode)");
    }
}
