//! Tokio wiring: one actor task owns the [`VehicleLink`]; the transport
//! reader, the retry timer and command callers all feed its inbox.

use std::time::{Duration, Instant};

use anyhow::{Context, Result as AnyResult};
use bytes::Bytes;
use skylink_wire::FrameSplitter;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

use crate::error::{FcError, Result};
use crate::events::LinkEvent;
use crate::link::{LinkSettings, LinkStats, VehicleLink};
use crate::timer::TokioTimer;
use crate::tracker::{Location, VehicleState};

pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub enum LinkInput {
    Frame(Bytes),
    RetryExpired(u64),
    Command(LinkCommand),
    TransportClosed,
}

#[derive(Debug)]
pub enum LinkCommand {
    SetMode { name: String, reply: oneshot::Sender<Result<u32>> },
    SetGuided { target: Location, reply: oneshot::Sender<Result<()>> },
    StartWaypointDownload,
    StartParameterDownload,
    Snapshot { reply: oneshot::Sender<LinkSnapshot> },
}

#[derive(Debug, Clone)]
pub struct LinkSnapshot {
    pub present: bool,
    pub state: VehicleState,
    pub stats: LinkStats,
}

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Companion heartbeat period, `None` to stay silent.
    pub heartbeat_interval: Option<Duration>,
    pub tick: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self { heartbeat_interval: Some(Duration::from_secs(1)), tick: DEFAULT_TICK }
    }
}

/// Cheap, cloneable front door to a running link.
#[derive(Debug, Clone)]
pub struct LinkHandle {
    tx: mpsc::UnboundedSender<LinkInput>,
}

impl LinkHandle {
    pub async fn set_mode(&self, name: &str) -> Result<u32> {
        let name = name.to_string();
        self.request(|reply| LinkCommand::SetMode { name, reply }).await?
    }

    pub async fn set_guided(&self, target: Location) -> Result<()> {
        self.request(|reply| LinkCommand::SetGuided { target, reply }).await?
    }

    pub async fn snapshot(&self) -> Result<LinkSnapshot> {
        self.request(|reply| LinkCommand::Snapshot { reply }).await
    }

    pub fn start_waypoint_download(&self) -> Result<()> {
        self.command(LinkCommand::StartWaypointDownload)
    }

    pub fn start_parameter_download(&self) -> Result<()> {
        self.command(LinkCommand::StartParameterDownload)
    }

    fn command(&self, cmd: LinkCommand) -> Result<()> {
        self.tx.send(LinkInput::Command(cmd)).map_err(|_| FcError::LinkClosed)
    }

    async fn request<R>(&self, make: impl FnOnce(oneshot::Sender<R>) -> LinkCommand) -> Result<R> {
        let (reply, rx) = oneshot::channel();
        self.command(make(reply))?;
        rx.await.map_err(|_| FcError::LinkClosed)
    }
}

pub struct SpawnedLink {
    pub handle: LinkHandle,
    pub events: mpsc::UnboundedReceiver<LinkEvent>,
    pub task: JoinHandle<()>,
}

pub fn open_serial(dev: &str, baud: u32) -> AnyResult<SerialStream> {
    tokio_serial::new(dev, baud)
        .open_native_async()
        .with_context(|| format!("open serial device {}", dev))
}

/// Run a link over any byte transport. Must be called inside a runtime.
pub fn spawn_link<R, W>(settings: LinkSettings, opts: RuntimeOptions, reader: R, writer: W) -> SpawnedLink
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (inbox_tx, inbox) = mpsc::unbounded_channel();
    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    let (event_tx, events) = mpsc::unbounded_channel();

    let timer_tx = inbox_tx.clone();
    let timer = TokioTimer::new(move |token| {
        let _ = timer_tx.send(LinkInput::RetryExpired(token));
    });
    let link = VehicleLink::new(settings, frame_tx, timer, event_tx);

    tokio::spawn(read_frames(reader, inbox_tx.clone()));
    tokio::spawn(write_frames(writer, frame_rx));
    let task = tokio::spawn(run_link(link, inbox, opts));

    SpawnedLink { handle: LinkHandle { tx: inbox_tx }, events, task }
}

type RuntimeLink = VehicleLink<mpsc::UnboundedSender<Bytes>, TokioTimer, mpsc::UnboundedSender<LinkEvent>>;

async fn run_link(mut link: RuntimeLink, mut inbox: mpsc::UnboundedReceiver<LinkInput>, opts: RuntimeOptions) {
    let mut tick = tokio::time::interval(opts.tick);
    let mut hb = tokio::time::interval(opts.heartbeat_interval.unwrap_or(Duration::from_secs(3600)));
    let send_hb = opts.heartbeat_interval.is_some();

    loop {
        tokio::select! {
            input = inbox.recv() => match input {
                Some(LinkInput::Frame(f)) => link.handle_frame(&f, Instant::now()),
                Some(LinkInput::RetryExpired(token)) => link.retry_expired(token),
                Some(LinkInput::Command(cmd)) => apply(&mut link, cmd),
                Some(LinkInput::TransportClosed) | None => break,
            },
            _ = tick.tick() => link.tick(Instant::now()),
            _ = hb.tick(), if send_hb => link.send_heartbeat(),
        }
    }
    info!("link stopped ({:?})", link.stats());
}

fn apply(link: &mut RuntimeLink, cmd: LinkCommand) {
    match cmd {
        LinkCommand::SetMode { name, reply } => {
            let _ = reply.send(link.set_mode(&name));
        }
        LinkCommand::SetGuided { target, reply } => {
            let _ = reply.send(link.set_guided(&target));
        }
        LinkCommand::StartWaypointDownload => link.start_waypoint_download(),
        LinkCommand::StartParameterDownload => link.start_parameter_download(),
        LinkCommand::Snapshot { reply } => {
            let _ = reply.send(LinkSnapshot {
                present: link.is_present(),
                state: link.state().clone(),
                stats: link.stats(),
            });
        }
    }
}

async fn read_frames<R: AsyncRead + Unpin>(mut reader: R, inbox: mpsc::UnboundedSender<LinkInput>) {
    let mut split = FrameSplitter::new();
    let mut buf = [0u8; 512];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                info!("transport closed");
                break;
            }
            Ok(n) => {
                split.push(&buf[..n]);
                while let Some(frame) = split.next_frame() {
                    if inbox.send(LinkInput::Frame(frame)).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                warn!("transport read failed: {}", e);
                break;
            }
        }
    }
    debug!("reader done, {} garbage bytes skipped", split.skipped());
    let _ = inbox.send(LinkInput::TransportClosed);
}

async fn write_frames<W: AsyncWrite + Unpin>(mut writer: W, mut frames: mpsc::UnboundedReceiver<Bytes>) {
    while let Some(frame) = frames.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            warn!("transport write failed: {}", e);
            break;
        }
    }
}
