use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use fundpal_cloud::{
    AuthService, AuthSession, Backend, BackendConfig, ChangeEvent, FundService, GroupService,
    MigrationService, RealtimeService, RestBackend, SettingsService,
};
use fundpal_storage::{IdentityResolver, LocalStore, LocalStoreExt, SqliteStore, default_store_path};
use fundpal_types::{FundPatch, Holding, NewFund, NewGroup, SettingsPatch, UserId, ViewMode};
use tracing::{debug, info, warn};

/// Local key holding the signed-in session between invocations.
const SESSION_KEY: &str = "fundpal_session";

#[derive(Parser)]
#[command(name = "fundpal")]
#[command(about = "Track fund holdings in a hosted backend")]
#[command(version)]
struct Cli {
    /// Path to the local store (defaults to the platform data directory)
    #[arg(long, env = "FUNDPAL_STORE")]
    store: Option<PathBuf>,

    /// Act as this user id
    #[arg(long, conflicts_with = "device_identity")]
    user: Option<String>,

    /// Use the device identity cached in the local store
    #[arg(long)]
    device_identity: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List tracked funds
    Funds {
        /// Print the full fund data as JSON
        #[arg(long)]
        json: bool,
    },

    /// Track a fund (renames it if already tracked)
    Add { code: String, name: String },

    /// Stop tracking a fund
    Remove { code: String },

    /// Set display order to the given sequence of codes
    Reorder {
        #[arg(required = true)]
        codes: Vec<String>,
    },

    /// Mark a fund as favorite
    Favorite {
        code: String,
        /// Clear the mark instead
        #[arg(long)]
        off: bool,
    },

    /// Collapse a fund card
    Collapse {
        code: String,
        /// Expand instead
        #[arg(long)]
        off: bool,
    },

    /// Record a holding (share count and cost basis)
    Hold { code: String, share: f64, cost: f64 },

    /// Forget the holding of a fund
    Unhold { code: String },

    /// Move a fund into a group
    Assign { code: String, group_id: String },

    /// Take a fund out of its group
    Unassign { code: String },

    /// List groups
    Groups,

    /// Append a group
    GroupAdd { id: String, name: String },

    /// Rename a group
    GroupRename { id: String, name: String },

    /// Delete a group
    GroupRemove { id: String },

    /// Show settings, or update them when an option is given
    Settings {
        /// Refresh interval in milliseconds
        #[arg(long)]
        refresh_ms: Option<u64>,
        #[arg(long, value_enum)]
        view_mode: Option<ViewModeArg>,
    },

    /// Copy the local snapshot to the backend (once)
    Migrate {
        /// Only report whether migration is needed
        #[arg(long)]
        check: bool,
        /// Forget that migration ran
        #[arg(long, conflicts_with = "check")]
        reset: bool,
    },

    /// Print change events for a table until interrupted
    Watch {
        #[arg(value_enum, default_value = "funds")]
        table: WatchTarget,
    },

    /// Create an account
    Signup { email: String, password: String },

    /// Sign in with email and password
    Signin { email: String, password: String },

    /// Sign out
    Signout,

    /// Show the current identity and signed-in user
    Whoami,
}

#[derive(Clone, Copy, ValueEnum)]
enum ViewModeArg {
    Card,
    List,
}

impl From<ViewModeArg> for ViewMode {
    fn from(arg: ViewModeArg) -> Self {
        match arg {
            ViewModeArg::Card => ViewMode::Card,
            ViewModeArg::List => ViewMode::List,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum WatchTarget {
    Funds,
    Groups,
    Settings,
}

struct App {
    store: Arc<dyn LocalStore>,
    backend: RestBackend,
    user: UserId,
}

impl App {
    fn data(&self) -> Arc<dyn Backend> {
        Arc::new(self.backend.clone())
    }

    fn auth(&self) -> AuthService {
        AuthService::new(Arc::new(self.backend.clone()))
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn resolver(cli: &Cli) -> IdentityResolver {
    match (&cli.user, cli.device_identity) {
        (Some(id), _) => IdentityResolver::Fixed(UserId::new(id.as_str())),
        (None, true) => IdentityResolver::Device,
        (None, false) => IdentityResolver::default(),
    }
}

async fn restore_session(store: &dyn LocalStore, backend: &RestBackend) {
    match store.get_json::<AuthSession>(SESSION_KEY) {
        Ok(Some(session)) => {
            debug!("restored session for {}", session.user.id);
            backend.set_session(session).await;
        }
        Ok(None) => {}
        Err(e) => warn!("ignoring stored session: {e}"),
    }
}

async fn persist_session(store: &dyn LocalStore, backend: &RestBackend) {
    let result = match backend.session().await {
        Some(session) => store.set_json(SESSION_KEY, &session),
        None => store.remove(SESSION_KEY),
    };
    if let Err(e) = result {
        warn!("failed to persist session: {e}");
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_event(event: ChangeEvent) {
    match serde_json::to_string(&event) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!("unprintable change event: {e}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let store_path = match cli.store.clone() {
        Some(path) => path,
        None => default_store_path().context("no local data directory; pass --store")?,
    };
    let store: Arc<dyn LocalStore> = Arc::new(
        SqliteStore::open(&store_path)
            .with_context(|| format!("failed to open local store at {}", store_path.display()))?,
    );
    let user = resolver(&cli).resolve(store.as_ref());
    debug!("acting as {user}");

    let config = BackendConfig::from_env().context("backend is not configured")?;
    let backend = RestBackend::new(config)?;
    restore_session(store.as_ref(), &backend).await;

    let app = App {
        store,
        backend,
        user,
    };
    let result = run(cli.command, &app).await;
    // Tokens may have rotated during the command.
    persist_session(app.store.as_ref(), &app.backend).await;
    result
}

async fn run(command: Commands, app: &App) -> Result<()> {
    let user = &app.user;

    match command {
        Commands::Funds { json } => {
            let data = FundService::new(app.data()).get_full_funds_data(user).await;
            if json {
                return print_json(&data);
            }
            if data.funds.is_empty() {
                println!("no funds tracked");
            }
            for fund in &data.funds {
                let star = if fund.is_favorite { "*" } else { " " };
                let holding = fund
                    .holding
                    .map(|h| format!("{} @ {}", h.share, h.cost))
                    .unwrap_or_default();
                let group = fund.group_id.as_deref().unwrap_or("-");
                println!("{star} {:<8} {:<24} {:<10} {holding}", fund.code, fund.name, group);
            }
        }

        Commands::Add { code, name } => {
            let fund = FundService::new(app.data())
                .add_fund(user, &NewFund::new(code, name))
                .await?;
            println!("tracking {} ({})", fund.code, fund.name);
        }

        Commands::Remove { code } => {
            if !FundService::new(app.data()).delete_fund(user, &code).await {
                bail!("failed to remove {code}");
            }
            println!("removed {code}");
        }

        Commands::Reorder { codes } => {
            if !FundService::new(app.data()).update_funds_order(user, codes.as_slice()).await {
                bail!("reorder did not complete");
            }
            println!("reordered {} funds", codes.len());
        }

        Commands::Favorite { code, off } => {
            let funds = FundService::new(app.data());
            match funds.toggle_favorite(user, &code, !off).await? {
                Some(_) => println!("{code} favorite: {}", !off),
                None => bail!("{code} is not tracked"),
            }
        }

        Commands::Collapse { code, off } => {
            let funds = FundService::new(app.data());
            match funds.toggle_collapsed(user, &code, !off).await? {
                Some(_) => println!("{code} collapsed: {}", !off),
                None => bail!("{code} is not tracked"),
            }
        }

        Commands::Hold { code, share, cost } => {
            let patch = FundPatch::set_holding(Holding::new(share, cost));
            match FundService::new(app.data()).update_fund(user, &code, &patch).await? {
                Some(_) => println!("{code}: {share} shares at {cost}"),
                None => bail!("{code} is not tracked"),
            }
        }

        Commands::Unhold { code } => {
            let patch = FundPatch::clear_holding();
            match FundService::new(app.data()).update_fund(user, &code, &patch).await? {
                Some(_) => println!("{code}: no holding"),
                None => bail!("{code} is not tracked"),
            }
        }

        Commands::Assign { code, group_id } => {
            let patch = FundPatch::set_group(group_id.as_str());
            match FundService::new(app.data()).update_fund(user, &code, &patch).await? {
                Some(_) => println!("{code} -> {group_id}"),
                None => bail!("{code} is not tracked"),
            }
        }

        Commands::Unassign { code } => {
            let patch = FundPatch::clear_group();
            match FundService::new(app.data()).update_fund(user, &code, &patch).await? {
                Some(_) => println!("{code} ungrouped"),
                None => bail!("{code} is not tracked"),
            }
        }

        Commands::Groups => {
            let groups = GroupService::new(app.data()).get_groups(user).await?;
            if groups.is_empty() {
                println!("no groups");
            }
            for group in groups {
                println!("{:>3} {:<16} {}", group.sort_order, group.id, group.name);
            }
        }

        Commands::GroupAdd { id, name } => {
            let group = GroupService::new(app.data())
                .add_group(user, &NewGroup::new(id, name))
                .await?;
            println!("added group {} at position {}", group.id, group.sort_order);
        }

        Commands::GroupRename { id, name } => {
            match GroupService::new(app.data()).rename_group(user, &id, &name).await? {
                Some(group) => println!("renamed {} to {}", group.id, group.name),
                None => bail!("no group {id}"),
            }
        }

        Commands::GroupRemove { id } => {
            if !GroupService::new(app.data()).delete_group(user, &id).await {
                bail!("failed to remove group {id}");
            }
            println!("removed group {id}");
        }

        Commands::Settings {
            refresh_ms,
            view_mode,
        } => {
            let settings = SettingsService::new(app.data());
            let patch = SettingsPatch {
                refresh_ms,
                view_mode: view_mode.map(ViewMode::from),
            };
            let current = if patch.is_empty() {
                settings.get_settings(user).await
            } else {
                settings.update_settings(user, &patch).await?
            };
            print_json(&current)?;
        }

        Commands::Migrate { check, reset } => {
            let migration = MigrationService::new(app.store.clone(), app.data(), user.clone());
            if reset {
                if !migration.reset() {
                    bail!("failed to reset migration state");
                }
                println!("migration state reset");
                return Ok(());
            }

            let needed = migration.check_migration_needed();
            if check {
                println!("migration needed: {needed}");
                return Ok(());
            }
            if !needed {
                println!("nothing to migrate");
                return Ok(());
            }
            if !migration.migrate().await {
                bail!("migration failed; local data is unchanged and can be retried");
            }
            println!("migration complete");
        }

        Commands::Watch { table } => {
            let realtime = RealtimeService::new(app.data());
            let subscription = match table {
                WatchTarget::Funds => realtime.subscribe_funds(user, print_event).await?,
                WatchTarget::Groups => realtime.subscribe_groups(user, print_event).await?,
                WatchTarget::Settings => realtime.subscribe_settings(user, print_event).await?,
            };
            info!("watching {}, press Ctrl-C to stop", subscription.table());
            tokio::signal::ctrl_c().await?;
            subscription.unsubscribe();
        }

        Commands::Signup { email, password } => {
            let data = app.auth().sign_up(&email, &password).await?;
            match (data.user, data.session) {
                (_, Some(session)) => println!("signed up and signed in as {}", session.user.id),
                (Some(user), None) => println!("signed up {}; confirm your email to sign in", user.id),
                (None, None) => println!("sign-up accepted"),
            }
        }

        Commands::Signin { email, password } => {
            let session = app.auth().sign_in(&email, &password).await?;
            println!(
                "signed in as {}",
                session.user.email.as_deref().unwrap_or(&session.user.id)
            );
        }

        Commands::Signout => {
            app.auth().sign_out().await?;
            println!("signed out");
        }

        Commands::Whoami => {
            println!("identity: {user}");
            match app.auth().current_user().await {
                Some(account) => println!(
                    "account: {} ({})",
                    account.id,
                    account.email.as_deref().unwrap_or("no email")
                ),
                None => println!("account: not signed in"),
            }
        }
    }

    Ok(())
}
