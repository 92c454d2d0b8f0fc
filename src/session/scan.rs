//! ScanFile session flow
//!
//! Drives one streaming scan RPC end to end: pipeline the upload into the
//! coordinator while hashing it, probe the gatekeeper cache, dispatch a
//! task on a miss, then pump backend events back to the client until the
//! FIN sentinel arrives.

use crate::broker::{self, Batch, Coordinator, Gatekeeper};
use crate::envelope::{AttributesStamp, EventEnvelope, RequestStamp};
use crate::proto::strelka::{Attributes, Request as ScanMeta, ScanRequest, ScanResponse};
use crate::session::{Session, FIN, POP_ERR_BACKOFF, POP_WINDOW};
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tonic::{Status, Streaming};

/// Run one ScanFile session to completion.
pub async fn run(
    coordinator: Coordinator,
    gatekeeper: Option<Gatekeeper>,
    responses: mpsc::Sender<ScanResponse>,
    mut inbound: Streaming<ScanRequest>,
    session: Session,
    out: mpsc::Sender<Result<ScanResponse, Status>>,
) -> Result<(), Status> {
    let key_data = broker::data_key(session.id());
    let key_event = broker::event_key(session.id());
    let key_org = broker::org_key(session.id());

    let mut hasher = Sha256::new();
    let mut attributes: Option<Attributes> = None;
    let mut metadata: Option<ScanMeta> = None;

    // Upload phase: one pipelined flush per inbound frame. The hash is fed
    // exactly the bytes that land on the data list, in the same order.
    while let Some(frame) = inbound.message().await? {
        if attributes.is_none() {
            attributes = frame.attributes;
        }
        if metadata.is_none() {
            metadata = frame.request;
        }

        let mut batch = Batch::new();
        if let Some(attr) = &attributes {
            if !attr.org_id.is_empty() {
                batch.set_with_ttl(&key_org, &attr.org_id, session.time_remaining());
            }
        }
        if !frame.data.is_empty() {
            hasher.update(&frame.data);
            batch.push_chunk(&key_data, &frame.data);
        }
        coordinator.flush(batch).await.map_err(Status::from)?;
    }

    // Nothing to scan.
    let (Some(attributes), Some(mut metadata)) = (attributes, metadata) else {
        return Ok(());
    };
    if metadata.id.is_empty() {
        metadata.id = session.id().to_string();
    }

    let key_cache = broker::cache_key(&hasher.finalize());
    let stamp = RequestStamp {
        attributes: Some(AttributesStamp::from(&attributes)),
        client: metadata.client.clone(),
        id: metadata.id.clone(),
        source: metadata.source.clone(),
        time: Utc::now().timestamp(),
    };
    let mut envelope = EventEnvelope::new(stamp).map_err(|e| Status::internal(e.to_string()))?;

    // Gatekeeper probe: replay cached events for previously scanned bytes
    // instead of dispatching a task.
    if metadata.gatekeeper {
        if let Some(gate) = &gatekeeper {
            let cached = gate.cached_events(&key_cache).await.map_err(Status::from)?;
            if !cached.is_empty() {
                for payload in &cached {
                    let event = envelope
                        .merge(payload)
                        .map_err(|e| Status::internal(e.to_string()))?;
                    emit(&responses, &out, &metadata.id, event).await?;
                }
                coordinator.delete(&key_data).await.map_err(Status::from)?;
                return Ok(());
            }
        }
    }

    coordinator
        .enqueue_task(broker::TASKS_KEY, session.id(), session.deadline_unix())
        .await
        .map_err(Status::from)?;

    // The cache is rewritten on every miss when a gatekeeper is configured,
    // whether or not this client opted in.
    let mut rewrite = gatekeeper.as_ref().map(|g| g.begin_rewrite(&key_cache));

    // Result pump: drain backend events until FIN. Cancellation is observed
    // at the loop head, so an abandoned session never outlives its client by
    // more than one pop window.
    loop {
        if session.expired() {
            return Err(Status::deadline_exceeded("session deadline elapsed"));
        }
        if out.is_closed() {
            return Err(Status::cancelled("client went away"));
        }

        let payload = match coordinator.pop_event(&key_event, POP_WINDOW).await {
            Ok(Some(payload)) => payload,
            Ok(None) => continue,
            Err(err) if err.is_transient() => {
                tracing::warn!(error = %err, "event pop failed, backing off");
                tokio::time::sleep(POP_ERR_BACKOFF).await;
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        if payload == FIN {
            break;
        }

        if let Some(rw) = rewrite.as_mut() {
            rw.append(&payload);
        }

        let event = envelope
            .merge(&payload)
            .map_err(|e| Status::internal(e.to_string()))?;
        emit(&responses, &out, &metadata.id, event).await?;
    }

    if let Some(rw) = rewrite {
        rw.commit().await.map_err(Status::from)?;
    }

    Ok(())
}

/// Tee one event to the response sink, then the client stream.
async fn emit(
    responses: &mpsc::Sender<ScanResponse>,
    out: &mpsc::Sender<Result<ScanResponse, Status>>,
    id: &str,
    event: String,
) -> Result<(), Status> {
    let resp = ScanResponse {
        id: id.to_string(),
        event,
    };
    if responses.send(resp.clone()).await.is_err() {
        tracing::debug!("response sink closed, dropping out-of-band copy");
    }
    if out.send(Ok(resp)).await.is_err() {
        return Err(Status::cancelled("client went away"));
    }
    Ok(())
}
