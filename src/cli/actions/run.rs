use super::Action;

/// Execute the action's business logic by delegating to the appropriate module
pub async fn execute(action: Action) -> anyhow::Result<()> {
    match action {
        Action::Serve {
            listen,
            port,
            timeout,
            module,
        } => crate::exporter::start(listen, port, timeout, module).await,
    }
}
