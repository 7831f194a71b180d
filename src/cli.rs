//! Subcommands and the terminal event loop for the capture flow.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

use photobooth_client::api::{ApiClient, AssetApi, Backend, PageQuery, Session, SessionStatus};
use photobooth_client::config::{self, CAPTURE_COST, PAGE_LIMIT};
use photobooth_client::dialog::{ConfirmDialog, ConfirmRequest};
use photobooth_client::history::{HistoryFeed, SessionDetail};
use photobooth_client::navigation::{RootStack, Route};
use photobooth_client::state::{CaptureEvent, CaptureState, CaptureStateMachine, FilterChoice};
use photobooth_client::storage::{FileStore, KeyValueStore};
use photobooth_client::store::{AuthStore, OnboardingStore};
use photobooth_client::topup::{self, format_points};
use photobooth_client::{AppContext, AppMessage};

#[derive(Parser, Debug)]
#[command(name = "photobooth", version, about = "Photobooth service client")]
pub struct Cli {
    /// Backend base URL, including the `/api/v1` prefix
    #[arg(long, env = "PHOTOBOOTH_API_BASE_URL", global = true)]
    api_base: Option<String>,

    /// Directory holding the remembered login
    #[arg(long, env = "PHOTOBOOTH_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Answer yes to every confirmation
    #[arg(short, long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and remember the session
    Login {
        email: String,
        #[arg(long, env = "PHOTOBOOTH_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account
    Register {
        name: String,
        email: String,
        #[arg(long, env = "PHOTOBOOTH_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored login
    Logout,
    /// Show the signed-in user and points balance
    Me,
    /// List the filters a session can apply
    Filters,
    /// Start a session on the photobooth named by a scanned QR code
    Capture {
        /// Raw QR payload (the photobooth id)
        qr: String,
        /// Filter to apply before capturing; repeatable
        #[arg(short, long = "filter")]
        filters: Vec<String>,
        /// Cancel the session instead of capturing
        #[arg(long)]
        cancel: bool,
    },
    /// List past sessions
    History {
        /// Follow every page
        #[arg(long)]
        all: bool,
    },
    /// Show one session with its photos and frames
    Session {
        id: String,
        #[arg(long)]
        frame: Option<String>,
    },
    /// Show bank transfer details for topping up points
    Topup {
        /// Amount in VND
        amount: String,
        /// Refresh the balance after transferring
        #[arg(long)]
        confirm: bool,
    },
}

struct Shell {
    backend: Arc<dyn Backend>,
    auth: Arc<AuthStore>,
    onboarding: OnboardingStore,
    root: RootStack,
    assume_yes: bool,
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = config::ENV_CONFIG.clone();
    if let Some(api_base) = cli.api_base {
        config = config.with_api_base(api_base);
    }
    if cli.data_dir.is_some() {
        config.data_dir = cli.data_dir;
    }

    let client = ApiClient::new(&config).context("Failed to build HTTP client")?;
    log::debug!("Using API at {}", client.base_url());
    let token_slot = client.token_slot();
    let storage: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&config)?);
    let backend: Arc<dyn Backend> = Arc::new(client);
    let auth = Arc::new(AuthStore::new(backend.clone(), token_slot, storage.clone()));
    let onboarding = OnboardingStore::load(storage);

    let authenticated = auth.check_auth_state().await;
    let root = RootStack::select(true, authenticated, onboarding.is_first_launch());
    log::debug!("Root stack: {:?}", root);

    let shell = Shell {
        backend,
        auth,
        onboarding,
        root,
        assume_yes: cli.yes,
    };

    match cli.command {
        Command::Login { email, password } => shell.login(&email, &password).await,
        Command::Register { name, email, password } => shell.register(&name, &email, &password).await,
        Command::Logout => {
            shell.auth.logout().await;
            println!("Signed out");
            Ok(())
        }
        Command::Me => shell.me().await,
        Command::Filters => shell.filters().await,
        Command::Capture { qr, filters, cancel } => shell.capture(qr, filters, cancel).await,
        Command::History { all } => shell.history(all).await,
        Command::Session { id, frame } => shell.session(&id, frame.as_deref()).await,
        Command::Topup { amount, confirm } => shell.topup(&amount, confirm).await,
    }
}

impl Shell {
    fn require_signed_in(&self) -> anyhow::Result<()> {
        match self.root {
            RootStack::App => Ok(()),
            RootStack::Onboarding => bail!("Welcome! Create an account with `photobooth register` to get started."),
            RootStack::Auth | RootStack::Splash => bail!("Not signed in. Run `photobooth login <email>` first."),
        }
    }

    async fn login(&self, email: &str, password: &str) -> anyhow::Result<()> {
        let user = self.auth.login(email, password).await?;
        self.onboarding.complete_onboarding();
        println!("Signed in as {} ({} points)", user.display_name(), format_points(user.points));
        Ok(())
    }

    async fn register(&self, name: &str, email: &str, password: &str) -> anyhow::Result<()> {
        let user = self.auth.register(name, email, password).await?;
        self.onboarding.complete_onboarding();
        println!("Welcome, {}!", user.display_name());
        Ok(())
    }

    async fn me(&self) -> anyhow::Result<()> {
        self.require_signed_in()?;
        let user = self.auth.current_user().await?;

        println!("{}", user.display_name());
        if let Some(ref email) = user.email {
            println!("  email:     {}", email);
        }
        println!("  points:    {}", format_points(user.points));
        println!("  reference: {}", topup::transfer_description(&user));
        Ok(())
    }

    async fn filters(&self) -> anyhow::Result<()> {
        self.require_signed_in()?;
        let page = self.backend.filters(PageQuery::new(1, PAGE_LIMIT)).await?;
        for filter in page.data {
            println!("{:<28} {}", filter.id, filter.filter_type);
        }
        Ok(())
    }

    async fn history(&self, all: bool) -> anyhow::Result<()> {
        self.require_signed_in()?;
        let mut feed = HistoryFeed::new();
        feed.refresh(self.backend.as_ref()).await?;
        if all {
            while feed.load_more(self.backend.as_ref()).await? {}
        }

        if feed.sessions.is_empty() {
            println!("No sessions yet");
        }
        for session in &feed.sessions {
            print_session_row(session);
        }
        if feed.has_more {
            println!("(more with --all)");
        }
        Ok(())
    }

    async fn session(&self, id: &str, frame: Option<&str>) -> anyhow::Result<()> {
        self.require_signed_in()?;
        let mut detail = SessionDetail::load(self.backend.as_ref(), id).await?;
        if let Some(frame) = frame {
            if !detail.select_frame(frame) {
                log::warn!("Unknown frame {}", frame);
            }
        }

        print_session_row(&detail.session);
        if detail.session.status == SessionStatus::Active {
            println!("  {} photos remaining", detail.session.remaining_photos());
        }
        for photo in detail.session.ordered_photos() {
            println!("  #{} {}", photo.order, photo.image_url);
        }
        for frame in &detail.frames {
            let marker = if detail.selected_frame.as_deref() == Some(frame.id.as_str()) {
                '*'
            } else {
                ' '
            };
            println!("  {} frame {} {}", marker, frame.id, frame.image_url);
        }
        Ok(())
    }

    async fn topup(&self, amount: &str, confirm: bool) -> anyhow::Result<()> {
        self.require_signed_in()?;
        let user = self.auth.current_user().await?;
        let plan = topup::plan_transfer(self.backend.as_ref(), &user, amount).await?;

        println!("Bank:      {} ({})", plan.bank.bank_name, plan.bank.bank_code);
        println!("Account:   {} - {}", plan.bank.account_number, plan.bank.account_holder_name);
        println!("Amount:    {} VND", format_points(plan.amount));
        println!("Reference: {}", plan.description);
        println!("QR:        {}", plan.qr_url);

        if confirm {
            let user = topup::confirm_transfer(&self.auth).await?;
            println!("{}", topup::TRANSFER_NOTICE);
            println!("Balance:   {} points", format_points(user.points));
        }
        Ok(())
    }

    async fn capture(&self, qr: String, filters: Vec<String>, cancel: bool) -> anyhow::Result<()> {
        self.require_signed_in()?;

        let dialog = Arc::new(ConfirmDialog::new());
        let responder = tokio::spawn(answer_dialogs(dialog.clone(), dialog.subscribe(), self.assume_yes));
        let (ctx, mut rx) = AppContext::new(self.backend.clone(), self.auth.clone(), dialog, Handle::current());

        let result = drive_capture(&ctx, &mut rx, qr, filters, cancel).await;

        ctx.process_event(CaptureEvent::ControlUnmounted);
        responder.abort();
        result
    }
}

fn print_session_row(session: &Session) {
    println!(
        "{:<28} {:<10} {}  {}/{} photos",
        session.id,
        session.status.as_str(),
        session.created_at.format("%Y-%m-%d %H:%M"),
        session.photo_count,
        session.max_photos
    );
}

/// Feed results back through the state machine until `done` accepts one
async fn pump(
    ctx: &Arc<AppContext>,
    rx: &mut mpsc::UnboundedReceiver<AppMessage>,
    done: impl Fn(&CaptureEvent, &CaptureStateMachine) -> bool,
) -> anyhow::Result<CaptureStateMachine> {
    loop {
        let AppMessage::Event(event) = rx.recv().await.context("Event channel closed")?;
        ctx.process_event(event.clone());

        let machine = ctx.machine();
        if done(&event, &machine) {
            return Ok(machine);
        }
    }
}

fn report_error(ctx: &Arc<AppContext>, machine: &CaptureStateMachine) {
    if let Some(ref error) = machine.error {
        eprintln!("Error: {}", error);
        ctx.process_event(CaptureEvent::ErrorAcknowledged);
    }
}

async fn drive_capture(
    ctx: &Arc<AppContext>,
    rx: &mut mpsc::UnboundedReceiver<AppMessage>,
    qr: String,
    filters: Vec<String>,
    cancel: bool,
) -> anyhow::Result<()> {
    ctx.process_event(CaptureEvent::ScreenFocused);
    let machine = pump(ctx, rx, |event, _| {
        matches!(
            event,
            CaptureEvent::PointsRefreshed { .. } | CaptureEvent::PointsRefreshFailed { .. }
        )
    })
    .await?;
    let balance = machine.points.unwrap_or(0);
    println!(
        "Balance: {} points, a session costs {}",
        format_points(balance),
        format_points(CAPTURE_COST)
    );

    ctx.process_event(CaptureEvent::StartRequested { photobooth_id: qr });
    let machine = ctx.machine();
    if let Some(message) = machine.inline_error {
        bail!(message);
    }
    if ctx.current_route() == Route::TopUpPoints {
        bail!(
            "Not enough points: {} more needed. Top up with `photobooth topup <amount>`.",
            format_points(CAPTURE_COST.saturating_sub(balance))
        );
    }

    let machine = pump(ctx, rx, |_, m| m.state == CaptureState::Active || m.error.is_some()).await?;
    if let Some(error) = machine.error {
        bail!(error);
    }
    let session = machine.session.context("Session missing after start")?;
    println!("Session {} started on {}", session.id, session.photobooth_id);
    ctx.process_event(CaptureEvent::ControlMounted);

    for filter_id in filters {
        ctx.process_event(CaptureEvent::ToggleFilter(FilterChoice::Filter(filter_id)));
        if !ctx.machine().filter_busy {
            continue;
        }
        let machine = pump(ctx, rx, |_, m| !m.filter_busy).await?;
        report_error(ctx, &machine);
    }
    let applied = ctx.machine().applied_filters().to_vec();
    if !applied.is_empty() {
        println!("Filters: {}", applied.join(", "));
    }

    if cancel {
        ctx.process_event(CaptureEvent::CancelRequested);
        let machine = pump(ctx, rx, |event, _| {
            matches!(
                event,
                CaptureEvent::SessionCancelled | CaptureEvent::CancelDeclined | CaptureEvent::CancelFailed { .. }
            )
        })
        .await?;
        if let Some(error) = machine.error {
            bail!(error);
        }
        if let CaptureState::Terminal(_) = machine.state {
            println!("Session cancelled");
            return Ok(());
        }
        println!("Keeping the session");
    }

    ctx.process_event(CaptureEvent::CaptureRequested);
    let machine = pump(ctx, rx, |event, _| {
        matches!(event, CaptureEvent::CaptureStarted | CaptureEvent::CaptureFailed { .. })
    })
    .await?;
    if let Some(error) = machine.error {
        bail!(error);
    }
    println!("Capture started, waiting for the photobooth to finish...");

    let machine = pump(ctx, rx, |_, m| matches!(m.state, CaptureState::Terminal(_))).await?;
    match machine.state {
        CaptureState::Terminal(Some(status)) => println!("Session {}", status),
        _ => println!("Lost track of the session, see `photobooth history`"),
    }
    log::debug!("Next screen: {}", ctx.current_route().name());
    Ok(())
}

async fn answer_dialogs(
    dialog: Arc<ConfirmDialog>,
    mut shown: watch::Receiver<Option<ConfirmRequest>>,
    assume_yes: bool,
) {
    loop {
        let request = shown.borrow_and_update().clone();
        if let Some(request) = request {
            let confirmed = assume_yes || ask(request).await;
            dialog.resolve(confirmed);
        }
        if shown.changed().await.is_err() {
            return;
        }
    }
}

async fn ask(request: ConfirmRequest) -> bool {
    let answer = tokio::task::spawn_blocking(move || {
        {
            let mut out = io::stdout().lock();
            let _ = write!(out, "{}", request.title);
            if let Some(ref message) = request.message {
                let _ = write!(out, ": {}", message);
            }
            if request.only_confirm {
                let _ = writeln!(out);
                return true;
            }
            let _ = write!(
                out,
                " [y = {}, N = {}] ",
                request.confirm_button.text, request.cancel_button.text
            );
            let _ = out.flush();
        }

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    })
    .await;

    answer.unwrap_or(false)
}
