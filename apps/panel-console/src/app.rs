use std::io::{self, IsTerminal};
use std::sync::Arc;

use panel_stream::transport::WebSocketConnector;
use panel_stream::{
    CredentialSource, IdentityResolver, Intent, MountContext, SessionController, SessionState,
    StaticCredential, StreamView, ViewCommand,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::{Cli, Command, LogsArgs};
use crate::console::{self, RawModeGuard, TerminalSink};
use crate::error::CliError;
use crate::sites::SitesClient;
use crate::token::TokenStore;

const LOG_HELP: &str = "s: start/stop   c: switch category   q: quit";

pub async fn run(cli: Cli) -> Result<(), CliError> {
    let credentials = credential_source(cli.token)?;

    let context = match cli.command {
        Command::Sites => return list_sites(&cli.api_url, credentials.as_ref()).await,
        Command::Shell(args) => MountContext::shell(args.site),
        Command::Logs(LogsArgs {
            site,
            category,
            follow,
        }) => {
            let site = match site {
                Some(site) => site,
                None => default_site(&cli.api_url, credentials.as_ref()).await?,
            };
            let context = MountContext::logs(Some(site), category);
            return mount(&cli.api_url, context, credentials, follow).await;
        }
    };
    mount(&cli.api_url, context, credentials, false).await
}

fn credential_source(token: Option<String>) -> Result<Arc<dyn CredentialSource>, CliError> {
    match token {
        Some(token) => Ok(Arc::new(StaticCredential::new(token))),
        None => {
            let store = TokenStore::discover()?;
            debug!(target: "panel::console", path = %store.path().display(), "using stored token");
            Ok(Arc::new(store))
        }
    }
}

fn require_credential(
    credentials: &dyn CredentialSource,
) -> Result<panel_stream::Credential, CliError> {
    credentials.current().ok_or_else(|| {
        let hint = TokenStore::default_path()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|_| "the panel token file".into());
        CliError::MissingToken(hint)
    })
}

async fn default_site(api_url: &str, credentials: &dyn CredentialSource) -> Result<String, CliError> {
    let credential = require_credential(credentials)?;
    let site = SitesClient::new(api_url)?.first_domain(&credential).await?;
    info!(target: "panel::console", site = %site, "no site given; using the first listed");
    Ok(site)
}

async fn list_sites(api_url: &str, credentials: &dyn CredentialSource) -> Result<(), CliError> {
    let credential = require_credential(credentials)?;
    let sites = SitesClient::new(api_url)?.list(&credential).await?;
    if sites.is_empty() {
        println!("no sites");
        return Ok(());
    }
    println!("{:>6}  {:<8}  {:<6}  DOMAIN", "ID", "TYPE", "ACTIVE");
    for site in sites {
        println!(
            "{:>6}  {:<8}  {:<6}  {}",
            site.id,
            site.kind.as_deref().unwrap_or("-"),
            if site.is_active { "yes" } else { "no" },
            site.domain
        );
    }
    Ok(())
}

async fn mount(
    api_url: &str,
    context: MountContext,
    credentials: Arc<dyn CredentialSource>,
    follow: bool,
) -> Result<(), CliError> {
    let resolver = IdentityResolver::new(api_url)?;
    require_credential(credentials.as_ref())?;

    let intent = context.intent;
    let sink = TerminalSink::stdout(intent == Intent::Logs);
    let controller = SessionController::new(
        context,
        resolver,
        credentials,
        WebSocketConnector::new(),
        sink,
    );

    let guard = RawModeGuard::new(io::stdout().is_terminal(), intent == Intent::Shell);
    let (tx, rx) = mpsc::unbounded_channel();
    console::spawn_input_reader(intent, tx.clone())?;

    let mut view = StreamView::mount(controller)?;
    if intent == Intent::Logs {
        view.controller_mut().notice(LOG_HELP);
        if follow {
            let _ = tx.send(ViewCommand::Start);
        }
    }
    drop(tx);

    let state = view.run(rx, intent == Intent::Shell).await;
    drop(guard);

    info!(target: "panel::console", %state, "view unmounted");
    match state {
        SessionState::Errored => eprintln!("\r\nconnection error"),
        SessionState::Closed(_) if intent == Intent::Shell => eprintln!("\r\nshell closed"),
        _ => {}
    }
    Ok(())
}
