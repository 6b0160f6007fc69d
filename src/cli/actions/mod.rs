mod run;

use crate::probe::Module;
use std::{net::IpAddr, time::Duration};

/// Action enum representing each possible command
#[derive(Debug)]
pub enum Action {
    Serve {
        listen: Option<IpAddr>,
        port: u16,
        timeout: Duration,
        module: Module,
    },
}

impl Action {
    /// Execute the action
    ///
    /// # Errors
    ///
    /// Returns an error if the action fails to execute
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
