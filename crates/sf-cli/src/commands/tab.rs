//! Reports browser tab events to the distraction gate.

use std::io::Write;

use anyhow::{Result, bail};
use sf_core::{GateDecision, IgnoreReason, Request, Response, TabEvent, TabEventKind};

use crate::Config;
use crate::client;

pub fn run<W: Write>(writer: &mut W, config: &Config, event: TabEvent) -> Result<()> {
    let mut daemon = client::connect(&config.socket_path)?;
    let decision = match daemon.call(&Request::TabEvent(event))? {
        Response::Gate { decision } => decision,
        other => bail!("unexpected reply from daemon: {other:?}"),
    };
    writeln!(writer, "{}", describe(&decision))?;
    Ok(())
}

/// Builds the event from command-line flags.
pub fn event(url: &str, tab_id: u64, completed: bool, background: bool) -> TabEvent {
    TabEvent {
        tab_id,
        url: url.to_string(),
        kind: if completed {
            TabEventKind::Completed
        } else {
            TabEventKind::Activated
        },
        active: !background,
    }
}

fn describe(decision: &GateDecision) -> String {
    match decision {
        GateDecision::Allowed { domain } => format!("{domain} is a work domain"),
        GateDecision::Prompt { domain } => format!("{domain} is not on the work list; prompting"),
        GateDecision::Ignored { reason } => {
            let why = match reason {
                IgnoreReason::RestrictedPage => "internal browser page",
                IgnoreReason::UnparseableUrl => "no hostname in URL",
                IgnoreReason::ExtensionDisabled => "gating disabled",
                IgnoreReason::NormalMode => "normal mode",
                IgnoreReason::OutsideScope => "no work phase running",
                IgnoreReason::InactiveTab => "background tab",
            };
            format!("ignored: {why}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StartArgs;
    use crate::commands::session;
    use crate::commands::test_support::{TestDaemon, test_config};

    fn report(config: &Config, url: &str, completed: bool, background: bool) -> String {
        let mut output = Vec::new();
        run(&mut output, config, event(url, 3, completed, background)).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn gate_runs_only_during_work() {
        let temp = tempfile::tempdir().unwrap();
        let config = test_config(temp.path());
        let _daemon = TestDaemon::spawn(&config);

        assert_eq!(
            report(&config, "https://reddit.com", false, false),
            "ignored: no work phase running\n"
        );

        let args = StartArgs {
            rest: false,
            minutes: None,
            seconds: Some(600),
        };
        session::start(&mut Vec::new(), &config, &args).unwrap();

        assert_eq!(
            report(&config, "https://www.reddit.com/r/rust", false, false),
            "reddit.com is not on the work list; prompting\n"
        );
        assert_eq!(
            report(&config, "https://reddit.com", true, true),
            "ignored: background tab\n"
        );
        assert_eq!(
            report(&config, "chrome://settings", false, false),
            "ignored: internal browser page\n"
        );
    }

    #[test]
    fn flags_map_to_event_kind() {
        let event = event("https://docs.rs", 9, true, true);
        assert_eq!(event.kind, TabEventKind::Completed);
        assert!(!event.active);
        assert!(!event.is_gateable());
    }
}
