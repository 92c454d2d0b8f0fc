//! Rule-set session flows
//!
//! Three auxiliary flows sharing the scan flow's queue and deadline
//! discipline: rule compilation, rule compilation-and-sync, and the
//! should-update probe. The first two upload through the coordinator,
//! dispatch a task, and drain a done-queue that terminates with either
//! `FIN` or an `ERROR:<msg>` token.

use crate::broker::{self, Batch, Coordinator};
use crate::proto::strelka::{
    CompileYaraRequest, CompileYaraResponse, RuleEntry, ShouldUpdateYaraRequest,
    ShouldUpdateYaraResponse, SyncYaraRequest, SyncYaraResponse,
};
use crate::session::{Session, FIN, POP_ERR_BACKOFF, POP_WINDOW};
use serde::Serialize;
use tokio::sync::mpsc;
use tonic::{Status, Streaming};

/// Prefix marking a failure token on a done-queue.
const ERROR_PREFIX: &str = "ERROR:";

/// Terminal token recognized on a done-queue.
#[derive(Debug, PartialEq, Eq)]
enum DoneToken {
    Fin,
    Error(String),
}

impl DoneToken {
    /// Recognize a terminal token; anything else is ignored by the drain
    /// loop. The message after `ERROR:` is kept verbatim, leading
    /// whitespace included.
    fn parse(token: &str) -> Option<Self> {
        if token == FIN {
            return Some(DoneToken::Fin);
        }
        token
            .strip_prefix(ERROR_PREFIX)
            .map(|msg| DoneToken::Error(msg.to_string()))
    }
}

/// Drain a done-queue until a terminal token arrives.
///
/// Returns the message carried by an `ERROR:` token, or an empty string on
/// `FIN`. Deadline expiry and client cancellation are observed at the loop
/// head.
async fn drain_done<T>(
    coordinator: &Coordinator,
    session: &Session,
    key: &str,
    out: &mpsc::Sender<Result<T, Status>>,
) -> Result<String, Status> {
    loop {
        if session.expired() {
            return Err(Status::deadline_exceeded("session deadline elapsed"));
        }
        if out.is_closed() {
            return Err(Status::cancelled("client went away"));
        }

        let token = match coordinator.pop_event(key, POP_WINDOW).await {
            Ok(Some(token)) => token,
            Ok(None) => continue,
            Err(err) if err.is_transient() => {
                tracing::warn!(error = %err, "done-queue pop failed, backing off");
                tokio::time::sleep(POP_ERR_BACKOFF).await;
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        match DoneToken::parse(&token) {
            Some(DoneToken::Fin) => return Ok(String::new()),
            Some(DoneToken::Error(msg)) => return Ok(msg),
            None => continue,
        }
    }
}

/// Run one CompileYara session to completion.
pub async fn compile(
    coordinator: Coordinator,
    mut inbound: Streaming<CompileYaraRequest>,
    session: Session,
    out: mpsc::Sender<Result<CompileYaraResponse, Status>>,
) -> Result<(), Status> {
    let key_rules = broker::compile_key(session.id());
    let key_done = broker::compile_done_key(session.id());

    while let Some(frame) = inbound.message().await? {
        if frame.data.is_empty() {
            continue;
        }
        let mut batch = Batch::new();
        batch.push_chunk(&key_rules, &frame.data);
        batch.expire_at(&key_rules, session.deadline_unix());
        coordinator.flush(batch).await.map_err(Status::from)?;
    }

    coordinator
        .enqueue_task(broker::TASKS_COMPILE_KEY, session.id(), session.deadline_unix())
        .await
        .map_err(Status::from)?;

    let error = drain_done(&coordinator, &session, &key_done, &out).await?;
    let resp = CompileYaraResponse {
        ok: error.is_empty(),
        error,
    };
    if out.send(Ok(resp)).await.is_err() {
        return Err(Status::cancelled("client went away"));
    }
    Ok(())
}

/// Rule entry as serialized onto the sync upload list.
#[derive(Debug, Serialize)]
struct RuleEntryRecord<'a> {
    name: &'a str,
    namespace: &'a str,
    source: &'a str,
    enabled: bool,
}

impl<'a> From<&'a RuleEntry> for RuleEntryRecord<'a> {
    fn from(entry: &'a RuleEntry) -> Self {
        Self {
            name: &entry.name,
            namespace: &entry.namespace,
            source: &entry.source,
            enabled: entry.enabled,
        }
    }
}

/// Run one SyncYara session to completion.
pub async fn sync(
    coordinator: Coordinator,
    mut inbound: Streaming<SyncYaraRequest>,
    session: Session,
    out: mpsc::Sender<Result<SyncYaraResponse, Status>>,
) -> Result<(), Status> {
    let key_org = broker::org_key(session.id());
    let key_rules = broker::sync_key(session.id());
    let key_done = broker::sync_done_key(session.id());

    let mut org_id = String::new();

    while let Some(frame) = inbound.message().await? {
        if org_id.is_empty() {
            org_id = frame.org_id;
        }
        if frame.data.is_empty() {
            continue;
        }

        let mut batch = Batch::new();
        batch.set_with_ttl(&key_org, &org_id, session.time_remaining());
        for entry in &frame.data {
            let record = serde_json::to_string(&RuleEntryRecord::from(entry))
                .map_err(|e| Status::internal(e.to_string()))?;
            batch.push_value(&key_rules, &record);
        }
        batch.expire_at(&key_rules, session.deadline_unix());
        coordinator.flush(batch).await.map_err(Status::from)?;
    }

    coordinator
        .enqueue_task(broker::TASKS_SYNC_KEY, session.id(), session.deadline_unix())
        .await
        .map_err(Status::from)?;

    let error = drain_done(&coordinator, &session, &key_done, &out).await?;

    let hash = coordinator
        .fetch(&broker::rules_hash_key(&org_id))
        .await
        .map_err(Status::from)?
        .ok_or_else(|| Status::internal("installed rule-set fingerprint missing"))?;

    let synced = coordinator
        .fetch(&broker::synced_count_key(session.id()))
        .await
        .map_err(Status::from)?
        .ok_or_else(|| Status::internal("sync count missing"))?;
    let synced: i32 = synced
        .parse()
        .map_err(|_| Status::internal(format!("non-numeric sync count '{synced}'")))?;

    let resp = SyncYaraResponse {
        hash: hash.into_bytes(),
        synced,
        error,
    };
    if out.send(Ok(resp)).await.is_err() {
        return Err(Status::cancelled("client went away"));
    }
    Ok(())
}

/// Run one ShouldUpdateYara session to completion.
///
/// Consumes the whole inbound stream for `(org_id, hash)`, then compares
/// against the installed fingerprint. A tenant with no installed rule set
/// compares as the empty string, so the client is told to update.
pub async fn should_update(
    coordinator: Coordinator,
    mut inbound: Streaming<ShouldUpdateYaraRequest>,
    out: mpsc::Sender<Result<ShouldUpdateYaraResponse, Status>>,
) -> Result<(), Status> {
    let mut org_id = String::new();
    let mut client_hash = Vec::new();

    while let Some(frame) = inbound.message().await? {
        if org_id.is_empty() {
            org_id = frame.org_id;
        }
        if client_hash.is_empty() {
            client_hash = frame.hash;
        }
    }

    let current = coordinator
        .fetch(&broker::rules_hash_key(&org_id))
        .await
        .map_err(Status::from)?
        .unwrap_or_default();

    let ok = client_hash != current.into_bytes();
    if out.send(Ok(ShouldUpdateYaraResponse { ok })).await.is_err() {
        return Err(Status::cancelled("client went away"));
    }
    Ok(())
}
