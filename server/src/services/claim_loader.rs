use std::time::Duration;

use claimmap_shared::ClaimSnapshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::state::AppState;

pub async fn run(state: AppState, url: String, refresh: Duration) {
    let mut interval = tokio::time::interval(refresh);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        match fetch_claims(&state.http_client, &url).await {
            Ok(snapshot) => {
                let worlds = snapshot.worlds.len();
                let factions = snapshot.faction_count();
                let cells = snapshot.claimed_cell_count();
                if snapshot.is_empty() {
                    debug!(%url, "claim source returned an empty snapshot");
                }
                state.replace_claims(snapshot).await;
                info!(worlds, factions, cells, "loaded claim snapshot");
            }
            Err(e) => {
                state.observability.record_claim_fetch_failure();
                warn!(%url, error = %e, "failed to fetch claims, keeping previous snapshot");
            }
        }
    }
}

async fn fetch_claims(
    client: &reqwest::Client,
    url: &str,
) -> Result<ClaimSnapshot, Box<dyn std::error::Error + Send + Sync>> {
    let resp = client.get(url).send().await?.error_for_status()?;
    let body = resp.bytes().await?;
    Ok(parse_claims_payload(&body)?)
}

fn parse_claims_payload(body: &[u8]) -> Result<ClaimSnapshot, serde_json::Error> {
    serde_json::from_slice(body)
}
