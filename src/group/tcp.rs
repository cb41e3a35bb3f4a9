//! Multi-process group over TCP
//!
//! Rank 0 acts as coordinator: it listens on the group address, waits for
//! every other rank to join, and then serves collectives. For each collective
//! it reads one contribution from every member in rank order, combines them
//! with its own, and sends the combined result back to every member.
//!
//! The public API is synchronous. Each group owns a current-thread tokio
//! runtime and blocks on it for the duration of a collective.
//!
//! Joining has a deadline (`connect_timeout`) covering both the connection
//! and the wait for WELCOME; members retry the connection until the
//! coordinator is up. Collectives have no timeout: a rank that never reaches
//! a collective stalls the group.
//!
//! Group formation fails fast. The first rejected JOIN (protocol version or
//! group size mismatch, out-of-range or duplicate rank, or a connection that
//! sends anything other than JOIN) aborts formation for the whole group: the
//! offender receives an ERROR message, the coordinator returns the error, and
//! members that already joined see their connection close before WELCOME.

use super::protocol::*;
use super::{expect_gathered, expect_value, gather_names, sum_values, ProcessGroup};
use anyhow::{Context, Result};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout_at, Instant};

/// Delay between connection attempts while the coordinator is not up yet
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Handle for one rank of a TCP process group
pub struct TcpGroup {
    rank: usize,
    size: usize,

    /// Connections; declared before the runtime so sockets close first
    link: Mutex<Link>,

    runtime: tokio::runtime::Runtime,
}

impl fmt::Debug for TcpGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpGroup")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Connections held by a rank
enum Link {
    /// Rank 0: one stream per member, index `r - 1` for rank `r`
    Coordinator { members: Vec<TcpStream>, seq: u64 },

    /// Ranks 1..size: the stream to rank 0
    Member { rank: usize, stream: TcpStream, seq: u64 },
}

impl TcpGroup {
    /// Join a group as `rank` of `size`
    ///
    /// Rank 0 binds `coordinator` and waits for the other ranks; every other
    /// rank connects to it.
    pub fn connect(rank: usize, size: usize, coordinator: &str, connect_timeout: Duration) -> Result<Self> {
        if size == 0 {
            anyhow::bail!("Group size must be at least 1");
        }
        if rank >= size {
            anyhow::bail!("Rank {} is out of range for a group of {}", rank, size);
        }

        if rank == 0 {
            let listener = std::net::TcpListener::bind(coordinator)
                .with_context(|| format!("Failed to bind coordinator address {}", coordinator))?;
            Self::coordinate(listener, size, connect_timeout)
        } else {
            Self::join(rank, size, coordinator, connect_timeout)
        }
    }

    /// Act as rank 0 on an already bound listener
    pub fn coordinate(listener: std::net::TcpListener, size: usize, connect_timeout: Duration) -> Result<Self> {
        if size == 0 {
            anyhow::bail!("Group size must be at least 1");
        }

        let runtime = build_runtime()?;
        listener.set_nonblocking(true)
            .context("Failed to configure coordinator listener")?;

        tracing::info!(
            address = %listener.local_addr().map(|a| a.to_string()).unwrap_or_default(),
            size,
            "waiting for ranks to join"
        );

        let members = runtime.block_on(accept_members(listener, size, connect_timeout))?;

        tracing::info!(size, "all ranks joined");

        Ok(Self {
            rank: 0,
            size,
            link: Mutex::new(Link::Coordinator { members, seq: 0 }),
            runtime,
        })
    }

    /// Join the coordinator at `coordinator` as member `rank`
    pub fn join(rank: usize, size: usize, coordinator: &str, connect_timeout: Duration) -> Result<Self> {
        if rank == 0 || rank >= size {
            anyhow::bail!("Member rank must be in 1..{}, got {}", size, rank);
        }

        let runtime = build_runtime()?;
        let stream = runtime.block_on(join_coordinator(rank, size, coordinator, connect_timeout))?;

        tracing::info!(rank, size, coordinator, "joined group");

        Ok(Self {
            rank,
            size,
            link: Mutex::new(Link::Member { rank, stream, seq: 0 }),
            runtime,
        })
    }

    fn collective(&self, payload: Payload, combine: fn(Vec<Payload>) -> Result<Payload>) -> Result<Payload> {
        let mut link = self.link.lock()
            .map_err(|_| anyhow::anyhow!("Group link poisoned by an earlier panic"))?;

        self.runtime.block_on(link.collective(payload, combine))
    }
}

impl ProcessGroup for TcpGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_reduce_sum(&self, value: f64) -> Result<f64> {
        expect_value(self.collective(Payload::Value(value), sum_values)?)
    }

    fn all_gather_names(&self, names: &[String]) -> Result<Vec<Vec<String>>> {
        expect_gathered(self.collective(Payload::Names(names.to_vec()), gather_names)?)
    }
}

impl Link {
    async fn collective(&mut self, payload: Payload, combine: fn(Vec<Payload>) -> Result<Payload>) -> Result<Payload> {
        match self {
            Link::Coordinator { members, seq } => {
                let current = *seq;
                *seq += 1;

                let mut contributions = Vec::with_capacity(members.len() + 1);
                contributions.push(payload);

                for (index, stream) in members.iter_mut().enumerate() {
                    let rank = index + 1;
                    let msg = read_message(stream).await
                        .with_context(|| format!("Failed to receive contribution from rank {}", rank))?;

                    match msg {
                        Message::Contribute(c) if c.seq == current => contributions.push(c.payload),
                        Message::Contribute(c) => anyhow::bail!(
                            "Rank {} contributed to collective {} while the group is at {}",
                            rank, c.seq, current
                        ),
                        Message::Error(e) => anyhow::bail!("Rank {} reported: {}", e.rank, e.error),
                        other => anyhow::bail!("Unexpected message from rank {}: {:?}", rank, other),
                    }
                }

                let combined = match combine(contributions) {
                    Ok(combined) => combined,
                    Err(e) => {
                        // Members are blocked on this collective; release them with the error
                        let abort = Message::Error(ErrorMessage { rank: 0, error: format!("{:#}", e) });
                        for stream in members.iter_mut() {
                            if let Err(send_err) = write_message(stream, &abort).await {
                                tracing::warn!(error = %send_err, "failed to notify member of aborted collective");
                            }
                        }
                        return Err(e);
                    }
                };

                let reply = Message::Combined(CombinedMessage { seq: current, payload: combined.clone() });
                for (index, stream) in members.iter_mut().enumerate() {
                    write_message(stream, &reply).await
                        .with_context(|| format!("Failed to send combined result to rank {}", index + 1))?;
                }

                Ok(combined)
            }
            Link::Member { rank, stream, seq } => {
                let current = *seq;
                *seq += 1;

                write_message(stream, &Message::Contribute(ContributeMessage { seq: current, payload })).await
                    .with_context(|| format!("Rank {} failed to send contribution", rank))?;

                match read_message(stream).await.context("Failed to receive combined result")? {
                    Message::Combined(c) if c.seq == current => Ok(c.payload),
                    Message::Combined(c) => anyhow::bail!(
                        "Coordinator answered collective {} while rank {} is at {}",
                        c.seq, rank, current
                    ),
                    Message::Error(e) => anyhow::bail!("Coordinator aborted collective {}: {}", current, e.error),
                    other => anyhow::bail!("Unexpected message from coordinator: {:?}", other),
                }
            }
        }
    }
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")
}

/// Accept `size - 1` members and return their streams in rank order
async fn accept_members(listener: std::net::TcpListener, size: usize, connect_timeout: Duration) -> Result<Vec<TcpStream>> {
    let listener = TcpListener::from_std(listener)
        .context("Failed to register coordinator listener")?;
    let deadline = Instant::now() + connect_timeout;

    let mut slots: Vec<Option<TcpStream>> = (1..size).map(|_| None).collect();
    let mut joined = 0;

    while joined < slots.len() {
        let (mut stream, addr) = timeout_at(deadline, listener.accept()).await
            .map_err(|_| anyhow::anyhow!(
                "Timed out waiting for ranks to join ({} of {} present)", joined + 1, size
            ))?
            .context("Failed to accept connection")?;
        stream.set_nodelay(true)
            .context("Failed to set TCP_NODELAY")?;

        let msg = timeout_at(deadline, read_message(&mut stream)).await
            .map_err(|_| anyhow::anyhow!("Timed out waiting for JOIN from {}", addr))??;

        let join = match msg {
            Message::Join(join) => join,
            other => anyhow::bail!("Expected JOIN from {}, got {:?}", addr, other),
        };

        if let Err(reason) = check_join(&join, size, &slots) {
            let error = ErrorMessage { rank: 0, error: reason.clone() };
            write_message(&mut stream, &Message::Error(error)).await?;
            anyhow::bail!("Rejected member from {}: {}", addr, reason);
        }

        tracing::debug!(rank = join.rank, node = %join.node_id, %addr, "rank joined");
        slots[join.rank - 1] = Some(stream);
        joined += 1;
    }

    let welcome = Message::Welcome(WelcomeMessage {
        protocol_version: PROTOCOL_VERSION,
        size,
    });

    let mut members = Vec::with_capacity(slots.len());
    for slot in slots {
        let mut stream = slot.context("Member slot empty after join")?;
        write_message(&mut stream, &welcome).await?;
        members.push(stream);
    }

    Ok(members)
}

/// Validate a JOIN against the group being formed
fn check_join(join: &JoinMessage, size: usize, slots: &[Option<TcpStream>]) -> std::result::Result<(), String> {
    if join.protocol_version != PROTOCOL_VERSION {
        return Err(format!(
            "Protocol version mismatch: coordinator={}, member={}",
            PROTOCOL_VERSION, join.protocol_version
        ));
    }
    if join.size != size {
        return Err(format!(
            "Group size mismatch: coordinator={}, rank {} expects {}",
            size, join.rank, join.size
        ));
    }
    if join.rank == 0 || join.rank >= size {
        return Err(format!("Rank {} is not a member rank of a group of {}", join.rank, size));
    }
    if slots[join.rank - 1].is_some() {
        return Err(format!("Rank {} joined twice", join.rank));
    }
    Ok(())
}

/// Connect to the coordinator (retrying until the deadline), send JOIN and wait for WELCOME
async fn join_coordinator(rank: usize, size: usize, coordinator: &str, connect_timeout: Duration) -> Result<TcpStream> {
    let deadline = Instant::now() + connect_timeout;

    let mut stream = loop {
        match TcpStream::connect(coordinator).await {
            Ok(stream) => break stream,
            Err(e) => {
                if Instant::now() >= deadline {
                    return Err(e).with_context(|| format!("Failed to connect to coordinator {}", coordinator));
                }
                sleep(CONNECT_RETRY_INTERVAL).await;
            }
        }
    };
    stream.set_nodelay(true)
        .context("Failed to set TCP_NODELAY")?;

    let join = JoinMessage {
        protocol_version: PROTOCOL_VERSION,
        rank,
        size,
        node_id: get_node_id(),
    };
    write_message(&mut stream, &Message::Join(join)).await?;

    // Welcome only arrives once every rank has joined
    let msg = timeout_at(deadline, read_message(&mut stream)).await
        .map_err(|_| anyhow::anyhow!("Timed out waiting for WELCOME from {}", coordinator))?
        .context("Coordinator closed the connection during join")?;

    match msg {
        Message::Welcome(welcome) if welcome.size == size => Ok(stream),
        Message::Welcome(welcome) => anyhow::bail!(
            "Coordinator confirmed a group of {}, rank {} expects {}",
            welcome.size, rank, size
        ),
        Message::Error(e) => anyhow::bail!("Coordinator rejected rank {}: {}", rank, e.error),
        other => anyhow::bail!("Expected WELCOME, got {:?}", other),
    }
}

/// Get node identifier (hostname)
fn get_node_id() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}
