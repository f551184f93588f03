//! Work-domain list management.

use std::io::Write;

use anyhow::Result;
use sf_core::Request;

use super::status::open_existing;
use super::util::{expect_domains, render_domains};
use crate::client::{self, DaemonClient};
use crate::{Config, DomainsAction};

pub fn run<W: Write>(writer: &mut W, config: &Config, action: &DomainsAction) -> Result<()> {
    let request = match action {
        DomainsAction::List => return list(writer, config),
        DomainsAction::Add { domain } => Request::AddWorkDomain {
            domain: domain.clone(),
        },
        DomainsAction::Remove { domain } => Request::RemoveWorkDomain {
            domain: domain.clone(),
        },
        DomainsAction::Clear => Request::ClearWorkDomains,
    };
    let mut daemon = client::connect(&config.socket_path)?;
    let domains = expect_domains(daemon.call(&request)?)?;
    render_domains(writer, &domains)?;
    Ok(())
}

/// Lists domains from the daemon, or from the store when it is not running.
fn list<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let domains = match DaemonClient::connect(&config.socket_path) {
        Ok(mut daemon) => expect_domains(daemon.call(&Request::ListWorkDomains)?)?,
        Err(_) => open_existing(config)?.work_domains()?.to_vec(),
    };
    render_domains(writer, &domains)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use sf_core::{WorkDomain, WorkDomainSet};
    use sf_db::Database;

    use super::*;
    use crate::commands::test_support::{TestDaemon, test_config};

    fn output_of(config: &Config, action: &DomainsAction) -> String {
        let mut output = Vec::new();
        run(&mut output, config, action).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn add_normalizes_and_lists_sorted() {
        let temp = tempfile::tempdir().unwrap();
        let config = test_config(temp.path());
        let _daemon = TestDaemon::spawn(&config);

        output_of(
            &config,
            &DomainsAction::Add {
                domain: "https://www.Wikipedia.org/wiki/Rust".to_string(),
            },
        );
        let listed = output_of(
            &config,
            &DomainsAction::Add {
                domain: "docs.rs".to_string(),
            },
        );
        assert_snapshot!(listed, @r"
        - docs.rs
        - wikipedia.org
        ");

        let after_remove = output_of(
            &config,
            &DomainsAction::Remove {
                domain: "wikipedia.org".to_string(),
            },
        );
        assert_snapshot!(after_remove, @"- docs.rs");
    }

    #[test]
    fn invalid_domain_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let config = test_config(temp.path());
        let _daemon = TestDaemon::spawn(&config);

        let err = run(
            &mut Vec::new(),
            &config,
            &DomainsAction::Add {
                domain: "not a domain".to_string(),
            },
        )
        .unwrap_err();
        assert!(err.to_string().ends_with("(validation)"), "{err}");
    }

    #[test]
    fn list_reads_store_when_daemon_is_down() {
        let temp = tempfile::tempdir().unwrap();
        let config = test_config(temp.path());
        let mut db = Database::open(&config.database_path).unwrap();
        let mut domains = WorkDomainSet::new();
        domains.insert(WorkDomain::parse("github.com").unwrap());
        db.set_work_domains(&domains).unwrap();

        assert_snapshot!(output_of(&config, &DomainsAction::List), @"- github.com");
    }

    #[test]
    fn mutations_need_the_daemon() {
        let temp = tempfile::tempdir().unwrap();
        let config = test_config(temp.path());
        assert!(run(&mut Vec::new(), &config, &DomainsAction::Clear).is_err());
    }
}
