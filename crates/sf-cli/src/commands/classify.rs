//! Answers to the distraction prompt.

use std::io::Write;

use anyhow::{Result, bail};
use sf_core::{Request, Response};

use super::util::expect_domains;
use crate::client;
use crate::{ClassifyAction, Config};

pub fn run<W: Write>(writer: &mut W, config: &Config, action: &ClassifyAction) -> Result<()> {
    let mut daemon = client::connect(&config.socket_path)?;
    match action {
        ClassifyAction::Work { domain, tab_id } => {
            let request = Request::ClassifyAsWork {
                tab_id: *tab_id,
                domain: domain.clone(),
            };
            let domains = expect_domains(daemon.call(&request)?)?;
            writeln!(
                writer,
                "Added {domain} to work domains ({} total)",
                domains.len()
            )?;
        }
        ClassifyAction::Reject { tab_id } => {
            match daemon.call(&Request::RejectDomain { tab_id: *tab_id })? {
                Response::Ack => {}
                other => bail!("unexpected reply from daemon: {other:?}"),
            }
            match tab_id {
                Some(tab_id) => writeln!(writer, "Closing tab {tab_id}")?,
                None => writeln!(writer, "Closing the distracting tab")?,
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DomainsAction;
    use crate::commands::domains;
    use crate::commands::test_support::{TestDaemon, test_config};

    #[test]
    fn classify_work_adds_domain() {
        let temp = tempfile::tempdir().unwrap();
        let config = test_config(temp.path());
        let _daemon = TestDaemon::spawn(&config);

        let mut output = Vec::new();
        run(
            &mut output,
            &config,
            &ClassifyAction::Work {
                domain: "www.khanacademy.org".to_string(),
                tab_id: Some(2),
            },
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Added www.khanacademy.org to work domains (1 total)\n"
        );

        let mut listed = Vec::new();
        domains::run(&mut listed, &config, &DomainsAction::List).unwrap();
        assert_eq!(String::from_utf8(listed).unwrap(), "- khanacademy.org\n");
    }

    #[test]
    fn reject_leaves_domains_untouched() {
        let temp = tempfile::tempdir().unwrap();
        let config = test_config(temp.path());
        let _daemon = TestDaemon::spawn(&config);

        let mut output = Vec::new();
        run(&mut output, &config, &ClassifyAction::Reject { tab_id: Some(7) }).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "Closing tab 7\n");

        let mut listed = Vec::new();
        domains::run(&mut listed, &config, &DomainsAction::List).unwrap();
        assert_eq!(String::from_utf8(listed).unwrap(), "No work domains.\n");
    }
}
