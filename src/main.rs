use std::sync::Arc;

use eyre::{
    Result,
    WrapErr,
};
use runtime::{
    collab::TracingSink,
    PttWatchdog,
    RadioServer,
    ReconnectConfig,
    Recorder,
    Router,
    Session,
    Supervisor,
    TimeslotManager,
};
use structopt::StructOpt as _;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use util::build;

pub use crate::options::Options;

mod options;
mod trace;

#[tokio::main]
async fn main() -> Result<()> {
    util::bootstrap!(
        "starting {} {} (built at {} with rustc {})",
        build::PACKAGE,
        build::VERSION,
        build::BUILD_TIMESTAMP,
        build::RUSTC_VERSION,
    );

    let options = Options::from_args();

    trace::init(options.pretty)?;

    tracing::info!(
        application = build::PACKAGE,
        version = build::VERSION,
        built_at = build::BUILD_TIMESTAMP,
        using_rustc = build::RUSTC_VERSION,
        "tracing subsystem initialized"
    );

    let cancel = CancellationToken::new();
    let signals = runtime::signals::cancel_on_signal(cancel.clone());

    let session_config = options.session();
    let event_buffer = session_config.event_buffer;
    let (session, session_events) = Session::new(session_config);
    let session = Arc::new(session);

    let watchdog = Arc::new(PttWatchdog::new(session.clone(), options.watchdog()));
    let server = Arc::new(RadioServer::new(options.server(), watchdog.clone()));
    let recorder = Arc::new(Recorder::from_config(&options.recorder()));

    let (timeslots, mut slot_changes) = TimeslotManager::new();
    let router =
        Router::new(timeslots, recorder.clone(), server.broadcaster(), Arc::new(TracingSink))
            .with_ptt_observer(watchdog.clone());

    let listener = server.bind().await.wrap_err("binding client listener")?;

    let (packets_tx, packets_rx) = mpsc::channel(event_buffer);
    let supervisor =
        Supervisor::new(session.clone(), options.auth.0.clone(), ReconnectConfig::default());

    let server_task = tokio::spawn(server.clone().serve(listener, cancel.clone()));
    let supervisor_task = tokio::spawn(supervisor.run(session_events, packets_tx, cancel.clone()));
    let router_task = tokio::spawn(router.run(packets_rx, cancel.clone()));

    let watchdog_task = tokio::spawn({
        let watchdog = watchdog.clone();
        let cancel = cancel.clone();

        async move { watchdog.run(cancel).await }
    });

    let slot_task = tokio::spawn(async move {
        while let Some(change) = slot_changes.recv().await {
            tracing::info!(
                slot = %change.slot,
                active = change.state.active,
                source_id = change.state.source_id,
                destination_id = change.state.destination_id,
                "timeslot changed"
            );
        }
    });

    cancel.cancelled().await;
    tracing::info!("shutting down");

    for (name, task) in [
        ("server", server_task),
        ("supervisor", supervisor_task),
        ("router", router_task),
        ("watchdog", watchdog_task),
        ("timeslots", slot_task),
    ] {
        util::trace_catch!(task.await, task = name, "task failed");
    }

    let saved = recorder.shutdown().await;
    if !saved.is_empty() {
        tracing::info!(count = saved.len(), "saved in-progress recordings");
    }

    session.disconnect().await;
    signals.abort();

    tracing::info!("shutdown complete");

    Ok(())
}
