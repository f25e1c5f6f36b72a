pub mod issue;
pub mod server;

#[derive(Debug)]
pub enum Action {
    Server(server::Args),
    Issue(issue::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        match self {
            Self::Server(args) => server::execute(args).await,
            Self::Issue(args) => issue::execute(args).await,
        }
    }
}
