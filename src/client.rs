use crate::{
    bet::{
        BetForm,
        BetFormError,
        BetRequest,
        Direction,
    },
    chain::RestClient,
    config::GameConfig,
    payload::AccountAddress,
    reporter::{
        BetResult,
        OutcomeSource,
        ResultReporter,
        SessionStats,
    },
    submitter::{
        CancelHandle,
        ChainClient,
        FAILURE_NOTICE,
        SUCCESS_NOTICE,
        Settlement,
        SubmissionError,
        TransactionSubmitter,
        Wallet,
        cancel_pair,
    },
    ui,
    wallets::{
        self,
        SessionWallet,
    },
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use rand::{
    SeedableRng,
    rngs::StdRng,
};
use std::{
    path::PathBuf,
    sync::Arc,
};
use tokio::task::JoinHandle;
use tracing::{
    error,
    info,
    warn,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const MAX_ERRORS: usize = 50;
const LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "dice-game.log";

#[derive(Clone, Debug)]
pub enum WalletConfig {
    Keystore { name: String, dir: PathBuf },
    None,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub game: GameConfig,
    pub wallet: WalletConfig,
    pub layout: ui::Layout,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NoticeKind {
    Success,
    Failure,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PendingKind {
    Bet(BetRequest),
    InitializeHouse,
}

struct PendingSubmission {
    kind: PendingKind,
    cancel: CancelHandle,
    task: JoinHandle<Result<Settlement, SubmissionError>>,
}

/// Everything the presentation layer needs for one frame.
#[derive(Clone, Debug)]
pub struct AppSnapshot {
    pub network_url: String,
    pub module: String,
    pub account: Option<AccountAddress>,
    pub stake_input: String,
    pub direction: Direction,
    pub can_submit: bool,
    pub pending: Option<PendingKind>,
    pub latest: Option<BetResult>,
    pub history: Vec<BetResult>,
    pub stats: SessionStats,
    pub status: String,
    pub notice: Option<Notice>,
    pub errors: Vec<String>,
    pub house_initialized: bool,
    pub house_edge_percent: u64,
    pub chain_id: Option<u8>,
}

/// Presentation-agnostic game session: bet form, the one in-flight
/// submission, and the result tally.
pub struct AppController<W, C> {
    submitter: TransactionSubmitter<W, C>,
    form: BetForm,
    reporter: ResultReporter,
    rng: StdRng,
    pending: Option<PendingSubmission>,
    status: String,
    notice: Option<Notice>,
    errors: Vec<String>,
    house_initialized: bool,
    chain_id: Option<u8>,
}

impl<W: Wallet, C: ChainClient> AppController<W, C> {
    pub fn new(submitter: TransactionSubmitter<W, C>) -> Self {
        Self::with_rng(submitter, StdRng::from_os_rng())
    }

    pub fn with_rng(submitter: TransactionSubmitter<W, C>, rng: StdRng) -> Self {
        let form = BetForm::new(submitter.config().coin_decimals);
        Self {
            submitter,
            form,
            reporter: ResultReporter::new(),
            rng,
            pending: None,
            status: String::from("Ready"),
            notice: None,
            errors: Vec::new(),
            house_initialized: false,
            chain_id: None,
        }
    }

    /// Records the chain id reported by the node, shown next to its URL.
    pub fn set_chain_id(&mut self, chain_id: u8) {
        self.chain_id = Some(chain_id);
    }

    pub fn form(&self) -> &BetForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut BetForm {
        &mut self.form
    }

    pub fn reporter(&self) -> &ResultReporter {
        &self.reporter
    }

    pub fn stats(&self) -> SessionStats {
        self.reporter.stats()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.submitter.is_connected()
    }

    /// Validates the form and starts a `play_dice` submission in the
    /// background. Refusals leave everything but the error list untouched.
    pub fn start_bet(&mut self) -> Result<(), BetFormError> {
        if self.pending.is_some() {
            return Err(BetFormError::InFlight);
        }
        let request = match self.form.submit(self.is_connected()) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "bet refused");
                self.push_errors(vec![e.to_string()]);
                return Err(e);
            }
        };
        info!(stake = %request.stake, direction = %request.direction, "placing bet");
        let (cancel, token) = cancel_pair();
        let submitter = self.submitter.clone();
        let task = tokio::spawn(async move { submitter.submit_bet(&request, token).await });
        self.pending = Some(PendingSubmission {
            kind: PendingKind::Bet(request),
            cancel,
            task,
        });
        self.notice = None;
        self.set_status(format!(
            "Rolling dice... {} on {}",
            request.stake, request.direction
        ));
        Ok(())
    }

    pub fn start_initialize_house(&mut self) -> Result<(), BetFormError> {
        if self.pending.is_some() {
            return Err(BetFormError::InFlight);
        }
        if !self.is_connected() {
            self.push_errors(vec![BetFormError::NotConnected.to_string()]);
            return Err(BetFormError::NotConnected);
        }
        let (cancel, token) = cancel_pair();
        let submitter = self.submitter.clone();
        let task = tokio::spawn(async move { submitter.initialize_house(token).await });
        self.pending = Some(PendingSubmission {
            kind: PendingKind::InitializeHouse,
            cancel,
            task,
        });
        self.notice = None;
        self.set_status(format!(
            "Initializing house with {}% edge...",
            self.submitter.config().house_edge_percent
        ));
        Ok(())
    }

    /// Stops waiting for confirmation. The transaction may still land on
    /// chain; the session simply does not count it.
    pub fn cancel_pending(&mut self) {
        if let Some(pending) = &self.pending {
            pending.cancel.cancel();
            self.set_status("Cancelling confirmation wait...");
        }
    }

    /// Resolves once the in-flight submission settles; never resolves when
    /// nothing is in flight.
    pub async fn wait_pending(&mut self) -> Result<Settlement, SubmissionError> {
        let Some(pending) = self.pending.as_mut() else {
            return std::future::pending().await;
        };
        match (&mut pending.task).await {
            Ok(res) => res,
            Err(join_err) => Err(SubmissionError::ConfirmationFailed {
                handle: None,
                cause: eyre!("submission task failed: {join_err}"),
            }),
        }
    }

    /// Applies the settled submission to session state and returns the form
    /// to idle.
    pub fn finish_pending(&mut self, res: Result<Settlement, SubmissionError>) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        match pending.kind {
            PendingKind::Bet(request) => {
                self.form.settle();
                match res {
                    Ok(settlement) => self.report_bet(request, settlement),
                    Err(e) => self.report_failure("bet", e),
                }
            }
            PendingKind::InitializeHouse => match res {
                Ok(settlement) => {
                    self.house_initialized = true;
                    info!(hash = %settlement.handle, "house initialized");
                    self.notice = Some(Notice {
                        kind: NoticeKind::Success,
                        message: "House initialized successfully!".to_string(),
                    });
                    self.set_status(format!("House initialized ({})", settlement.handle));
                }
                Err(e) => self.report_failure("house initialization", e),
            },
        }
    }

    pub fn abort_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.cancel.cancel();
            pending.task.abort();
            if matches!(pending.kind, PendingKind::Bet(_)) {
                self.form.settle();
            }
        }
    }

    fn report_bet(&mut self, request: BetRequest, settlement: Settlement) {
        let chain_roll = self
            .submitter
            .config()
            .settlement_event
            .as_deref()
            .and_then(|suffix| settlement.confirmation.settled_roll(suffix));
        let hash = settlement.handle.0;
        let result = match chain_roll {
            Some(face) => self.reporter.record(
                request.stake,
                request.direction,
                face,
                OutcomeSource::ChainEvent,
                hash,
            ),
            None => self.reporter.settle(
                request.stake,
                request.direction,
                hash,
                &mut self.rng,
            ),
        };
        let verdict = if result.outcome.won {
            "You won!"
        } else {
            "You lost"
        };
        let status = format!(
            "Rolled {} | Bet: {} on {} | {}",
            result.outcome.rolled.value(),
            result.stake,
            result.direction,
            verdict
        );
        self.notice = Some(Notice {
            kind: NoticeKind::Success,
            message: SUCCESS_NOTICE.to_string(),
        });
        self.set_status(status);
    }

    fn report_failure(&mut self, what: &str, e: SubmissionError) {
        error!(error = %e, "{what} failed");
        self.notice = Some(Notice {
            kind: NoticeKind::Failure,
            message: FAILURE_NOTICE.to_string(),
        });
        self.push_errors(vec![format!("{what} failed: {e}")]);
        self.set_status("Ready");
    }

    pub fn snapshot(&self) -> AppSnapshot {
        let config = self.submitter.config();
        AppSnapshot {
            network_url: config.network.url().to_string(),
            module: format!("{}::{}", config.module.address.short(), config.module.name),
            account: self.submitter.account(),
            stake_input: self.form.stake_input().to_string(),
            direction: self.form.direction(),
            can_submit: self.form.can_submit(self.is_connected()) && self.pending.is_none(),
            pending: self.pending.as_ref().map(|p| p.kind),
            latest: self.reporter.latest().cloned(),
            history: self.reporter.history().cloned().collect(),
            stats: self.reporter.stats(),
            status: self.status.clone(),
            notice: self.notice.clone(),
            errors: self.errors.clone(),
            house_initialized: self.house_initialized,
            house_edge_percent: config.house_edge_percent,
            chain_id: self.chain_id,
        }
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
    }

    fn push_errors(&mut self, mut items: Vec<String>) {
        if items.is_empty() {
            return;
        }
        self.errors.append(&mut items);
        if self.errors.len() > MAX_ERRORS {
            let drain = self.errors.len() - MAX_ERRORS;
            self.errors.drain(0..drain);
        }
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    /// Applies a form-editing or session event. Returns `false` on quit.
    pub fn handle_event(&mut self, ev: ui::UserEvent) -> bool {
        match ev {
            ui::UserEvent::Quit => return false,
            ui::UserEvent::Redraw => {}
            ui::UserEvent::Roll => {
                let _ = self.start_bet();
            }
            ui::UserEvent::InitializeHouse => {
                let _ = self.start_initialize_house();
            }
            ui::UserEvent::CancelPending => self.cancel_pending(),
            ui::UserEvent::SetDirection(direction) => self.form.set_direction(direction),
            ui::UserEvent::ToggleDirection => self.form.toggle_direction(),
            ui::UserEvent::StakeDigit(c) => self.form.push_digit(c),
            ui::UserEvent::StakeDecimalPoint => self.form.push_decimal_point(),
            ui::UserEvent::StakeBackspace => self.form.backspace(),
            ui::UserEvent::StakeIncrement => self.form.increment(),
            ui::UserEvent::StakeDecrement => self.form.decrement(),
            ui::UserEvent::DismissErrors => self.clear_errors(),
        }
        true
    }
}

/// Routes tracing output to a daily rolling file; the terminal belongs to
/// the UI. Keep the guard alive for the life of the process.
pub fn init_tracing() -> Option<WorkerGuard> {
    let appender = tracing_appender::rolling::daily(LOG_DIR, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .ok()
        .map(|_| guard)
}

pub fn connect_wallet(config: &WalletConfig, node: &RestClient) -> Result<SessionWallet> {
    match config {
        WalletConfig::Keystore { name, dir } => {
            let descriptor = wallets::find_wallet(dir, name)?;
            let wallet = wallets::unlock_wallet(&descriptor, node.clone())?;
            info!(wallet = %name, address = %wallet.address(), "wallet unlocked");
            Ok(SessionWallet::Keystore(wallet))
        }
        WalletConfig::None => {
            warn!("starting without a wallet");
            Ok(SessionWallet::Disconnected)
        }
    }
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let AppConfig {
        game,
        wallet,
        layout,
    } = config;
    info!(node = %game.network.url(), module = %game.module.address, "connecting");
    let node = RestClient::new(game.network.url())?;
    let chain_id = node
        .chain_id()
        .await
        .wrap_err_with(|| format!("node at {} is unreachable", node.base_url()))?;
    info!(chain_id, "node reachable");
    let wallet = connect_wallet(&wallet, &node)?;
    let submitter = TransactionSubmitter::new(Arc::new(game), Arc::new(wallet), Arc::new(node));
    let mut controller = AppController::new(submitter);
    controller.set_chain_id(chain_id);

    let mut ui_state = ui::UiState::new(layout);
    let mut input_events = ui::input_event_stream();

    info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(controller, &mut ui_state, &mut input_events).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop<W: Wallet, C: ChainClient>(
    mut controller: AppController<W, C>,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()> {
    info!("Running app loop");
    ui::draw(ui_state, &controller.snapshot()).wrap_err("initial draw failed")?;

    loop {
        tokio::select! {
            res = controller.wait_pending() => {
                controller.finish_pending(res);
                ui::draw(ui_state, &controller.snapshot())
                    .wrap_err("draw after settlement failed")?;
            }
            _ = tokio::signal::ctrl_c() => {
                controller.abort_pending();
                break;
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                if !controller.handle_event(ev) {
                    controller.abort_pending();
                    break;
                }
                ui::draw(ui_state, &controller.snapshot())
                    .wrap_err("draw after input failed")?;
            }
        }
    }
    info!(
        games = controller.stats().games_played(),
        wins = controller.stats().wins(),
        "session ended"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        reporter::is_win,
        test_helpers::{
            FakeChain,
            FakeWallet,
            TestContext,
            test_config,
        },
    };

    fn controller(ctx: &TestContext) -> AppController<FakeWallet, FakeChain> {
        AppController::with_rng(ctx.submitter(), StdRng::seed_from_u64(42))
    }

    async fn settle(controller: &mut AppController<FakeWallet, FakeChain>) {
        let res = controller.wait_pending().await;
        controller.finish_pending(res);
    }

    #[tokio::test]
    async fn start_bet__refuses_without_wallet_and_keeps_stats() {
        // given
        let ctx = TestContext::new(FakeWallet::disconnected(), FakeChain::confirming());
        let mut controller = controller(&ctx);
        let before = controller.stats();

        // when
        let res = controller.start_bet();

        // then
        assert_eq!(res, Err(BetFormError::NotConnected));
        assert_eq!(controller.stats(), before);
        assert!(!controller.is_pending());
        assert!(ctx.wallet.submitted().is_empty());
        assert_eq!(controller.errors().len(), 1);
    }

    #[tokio::test]
    async fn start_bet__refuses_stake_below_one_without_payload() {
        // given
        let ctx = TestContext::new(FakeWallet::connected(), FakeChain::confirming());
        let mut controller = controller(&ctx);
        controller.form_mut().set_stake_input("0.5");

        // when
        let res = controller.start_bet();

        // then
        assert_eq!(res, Err(BetFormError::StakeTooSmall));
        assert!(!controller.is_pending());
        tokio::task::yield_now().await;
        assert!(ctx.wallet.submitted().is_empty());
    }

    #[tokio::test]
    async fn confirmed_bet__counts_exactly_one_game() {
        // given
        let ctx = TestContext::new(FakeWallet::connected(), FakeChain::confirming());
        let mut controller = controller(&ctx);
        controller.form_mut().set_direction(Direction::Low);

        // when
        controller.start_bet().unwrap();
        assert!(!controller.snapshot().can_submit);
        settle(&mut controller).await;

        // then
        let stats = controller.stats();
        let latest = controller.reporter().latest().unwrap().clone();
        assert_eq!(stats.games_played(), 1);
        assert_eq!(stats.wins(), u64::from(latest.outcome.won));
        assert_eq!(latest.outcome.won, is_win(Direction::Low, latest.outcome.rolled));
        assert_eq!(latest.source, OutcomeSource::Simulated);
        assert_eq!(controller.notice().unwrap().kind, NoticeKind::Success);
        assert!(controller.form().can_submit(true));
        assert_eq!(ctx.wallet.submitted().len(), 1);
    }

    #[tokio::test]
    async fn confirmed_bet__uses_roll_from_settlement_event() {
        // given
        let mut config = test_config();
        config.settlement_event = Some("DiceGame::DiceRolled".to_string());
        let ctx = TestContext::with_config(
            FakeWallet::connected(),
            FakeChain::confirming_roll(2),
            config,
        );
        let mut controller = controller(&ctx);
        controller.form_mut().set_direction(Direction::High);

        // when
        controller.start_bet().unwrap();
        settle(&mut controller).await;

        // then
        let latest = controller.reporter().latest().unwrap();
        assert_eq!(latest.source, OutcomeSource::ChainEvent);
        assert_eq!(latest.outcome.rolled.value(), 2);
        assert!(!latest.outcome.won);
        assert_eq!(controller.stats().losses(), 1);
    }

    #[tokio::test]
    async fn chain_error__leaves_stats_and_returns_to_idle() {
        // given
        let ctx = TestContext::new(
            FakeWallet::connected(),
            FakeChain::failing("connection reset by node"),
        );
        let mut controller = controller(&ctx);

        // when
        controller.start_bet().unwrap();
        settle(&mut controller).await;

        // then
        assert_eq!(controller.stats(), SessionStats::default());
        assert!(controller.reporter().latest().is_none());
        assert_eq!(controller.notice().unwrap().kind, NoticeKind::Failure);
        assert!(controller.errors()[0].contains("connection reset by node"));
        assert!(controller.snapshot().can_submit);
    }

    #[tokio::test]
    async fn cancel_pending__releases_a_stalled_wallet() {
        // given
        let ctx = TestContext::new(FakeWallet::stalling(), FakeChain::confirming());
        let mut controller = controller(&ctx);
        controller.start_bet().unwrap();
        tokio::task::yield_now().await;

        // when
        controller.cancel_pending();
        tokio::time::timeout(std::time::Duration::from_millis(100), settle(&mut controller))
            .await
            .unwrap();

        // then
        assert_eq!(controller.stats().games_played(), 0);
        assert!(!controller.is_pending());
        assert!(controller.snapshot().can_submit);
    }

    #[test]
    fn snapshot__carries_chain_id_once_known() {
        let ctx = TestContext::new(FakeWallet::connected(), FakeChain::confirming());
        let mut controller = controller(&ctx);
        assert_eq!(controller.snapshot().chain_id, None);

        controller.set_chain_id(2);

        assert_eq!(controller.snapshot().chain_id, Some(2));
    }

    #[tokio::test]
    async fn second_bet__refused_while_first_in_flight() {
        // given
        let ctx = TestContext::new(FakeWallet::connected(), FakeChain::stalled());
        let mut controller = controller(&ctx);
        controller.start_bet().unwrap();

        // when
        let res = controller.start_bet();

        // then
        assert_eq!(res, Err(BetFormError::InFlight));
        controller.abort_pending();
    }

    #[tokio::test]
    async fn aborted_transaction__leaves_stats_and_reports_failure() {
        // given
        let ctx = TestContext::new(
            FakeWallet::connected(),
            FakeChain::aborting("Move abort: EINSUFFICIENT_HOUSE_BALANCE"),
        );
        let mut controller = controller(&ctx);

        // when
        controller.start_bet().unwrap();
        settle(&mut controller).await;

        // then
        assert_eq!(controller.stats(), SessionStats::default());
        assert_eq!(controller.notice().unwrap().message, FAILURE_NOTICE);
        assert!(controller.errors()[0].contains("EINSUFFICIENT_HOUSE_BALANCE"));
        assert!(controller.snapshot().can_submit);
    }

    #[tokio::test]
    async fn stalled_chain__times_out_and_returns_to_idle() {
        // given
        let ctx = TestContext::new(FakeWallet::connected(), FakeChain::stalled());
        let mut controller = controller(&ctx);

        // when
        controller.start_bet().unwrap();
        settle(&mut controller).await;

        // then
        assert_eq!(controller.stats().games_played(), 0);
        assert!(controller.errors()[0].contains("gave up waiting"));
        assert!(!controller.is_pending());
    }

    #[tokio::test]
    async fn cancel_pending__stops_wait_without_counting() {
        // given
        let ctx = TestContext::new(FakeWallet::connected(), FakeChain::stalled());
        let mut controller = controller(&ctx);
        controller.start_bet().unwrap();

        // when
        controller.cancel_pending();
        settle(&mut controller).await;

        // then
        assert_eq!(controller.stats().games_played(), 0);
        assert!(controller.errors()[0].contains("stopped waiting"));
        assert!(controller.snapshot().can_submit);
    }

    #[tokio::test]
    async fn initialize_house__marks_session_flag() {
        // given
        let ctx = TestContext::new(FakeWallet::connected(), FakeChain::confirming());
        let mut controller = controller(&ctx);

        // when
        controller.start_initialize_house().unwrap();
        settle(&mut controller).await;

        // then
        assert!(controller.snapshot().house_initialized);
        let submitted = ctx.wallet.submitted();
        assert!(submitted[0].function.ends_with("::DiceGame::initialize_house"));
        assert_eq!(controller.stats().games_played(), 0);
    }

    #[test]
    fn handle_event__edits_form_and_signals_quit() {
        let ctx = TestContext::new(FakeWallet::connected(), FakeChain::confirming());
        let mut controller = controller(&ctx);

        assert!(controller.handle_event(ui::UserEvent::StakeDigit('2')));
        assert!(controller.handle_event(ui::UserEvent::SetDirection(Direction::Low)));
        assert_eq!(controller.form().stake_input(), "12");
        assert_eq!(controller.form().direction(), Direction::Low);
        assert!(!controller.handle_event(ui::UserEvent::Quit));
    }
}
