//! Darwin departure-board adapter.
//!
//! Talks to a Huxley-style JSON proxy in front of National Rail's Darwin
//! LDBWS: `GET {base}/departures/{ORIGIN}/to/{DEST}/{rows}`.

use std::{sync::RwLock, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use railwatch_core::{
    board::{select_service, BoardEntry, DepartureBoard, ServiceStatus},
    domain::MonitoredService,
    errors::Error,
    Result,
};

#[derive(Clone, Debug)]
pub struct DarwinConfig {
    pub base_url: String,
    pub access_token: Option<String>,
    pub rows: u32,
    pub timeout: Duration,
}

pub struct DarwinBoard {
    cfg: DarwinConfig,
    http: RwLock<reqwest::Client>,
}

impl DarwinBoard {
    pub fn new(cfg: DarwinConfig) -> Result<Self> {
        let http = build_client(cfg.timeout)?;
        Ok(Self {
            cfg,
            http: RwLock::new(http),
        })
    }

    fn client(&self) -> reqwest::Client {
        match self.http.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn board_url(&self, service: &MonitoredService) -> String {
        format!(
            "{}/departures/{}/to/{}/{}",
            self.cfg.base_url.trim_end_matches('/'),
            service.origin(),
            service.destination(),
            self.cfg.rows
        )
    }

    async fn fetch_board(&self, service: &MonitoredService) -> Result<Vec<BoardEntry>> {
        let mut req = self.client().get(self.board_url(service));
        if let Some(token) = &self.cfg.access_token {
            req = req.query(&[("accessToken", token)]);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::External(format!("darwin request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "darwin board request failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| Error::External(format!("darwin read error: {e}")))?;
        parse_board(&body)
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::External(format!("darwin client build failed: {e}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StationBoard {
    #[serde(default)]
    train_services: Option<Vec<TrainService>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrainService {
    #[serde(default)]
    std: Option<String>,
    #[serde(default)]
    etd: Option<String>,
    #[serde(default)]
    is_cancelled: bool,
    #[serde(default)]
    destination: Option<Vec<Location>>,
}

#[derive(Debug, Deserialize)]
struct Location {
    #[serde(default)]
    crs: Option<String>,
}

impl From<TrainService> for BoardEntry {
    fn from(s: TrainService) -> Self {
        BoardEntry {
            scheduled: s.std.unwrap_or_default(),
            estimate: s.etd.unwrap_or_default(),
            destinations: s
                .destination
                .unwrap_or_default()
                .into_iter()
                .filter_map(|l| l.crs)
                .collect(),
            cancelled: s.is_cancelled,
        }
    }
}

/// Decode a board response. A board with no services (`null` or missing) is
/// an empty list, not an error.
fn parse_board(body: &str) -> Result<Vec<BoardEntry>> {
    let board: StationBoard = serde_json::from_str(body)?;
    Ok(board
        .train_services
        .unwrap_or_default()
        .into_iter()
        .map(BoardEntry::from)
        .collect())
}

#[async_trait]
impl DepartureBoard for DarwinBoard {
    async fn query(&self, service: &MonitoredService) -> Result<Option<ServiceStatus>> {
        let entries = self.fetch_board(service).await?;
        let status = select_service(&entries, service).map(|e| e.status(service.scheduled()));
        debug!(service = %service, rows = entries.len(), status = ?status, "board queried");
        Ok(status)
    }

    async fn reset(&self) {
        match build_client(self.cfg.timeout) {
            Ok(client) => {
                if let Ok(mut guard) = self.http.write() {
                    *guard = client;
                }
                debug!("darwin client rebuilt");
            }
            Err(e) => warn!(error = %e, "failed to rebuild darwin client"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn board_json(services: serde_json::Value) -> String {
        json!({
            "locationName": "Hitchin",
            "crs": "HIT",
            "trainServices": services,
        })
        .to_string()
    }

    #[test]
    fn decodes_huxley_rows() {
        let body = board_json(json!([
            {
                "std": "09:15",
                "etd": "09:22",
                "isCancelled": false,
                "destination": [{ "locationName": "London Kings Cross", "crs": "KGX" }]
            },
            {
                "std": "09:45",
                "etd": "Cancelled",
                "isCancelled": true,
                "destination": [{ "locationName": "Peterborough", "crs": "PBO" }]
            }
        ]));
        let rows = parse_board(&body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].scheduled, "09:15");
        assert_eq!(rows[0].destinations, vec!["KGX"]);
        assert!(rows[1].cancelled);
    }

    #[test]
    fn null_services_is_an_empty_board() {
        assert!(parse_board(&board_json(serde_json::Value::Null))
            .unwrap()
            .is_empty());
        assert!(parse_board("{}").unwrap().is_empty());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(matches!(parse_board("<html>"), Err(Error::Json(_))));
    }

    #[test]
    fn selects_status_from_decoded_board() {
        let svc = MonitoredService::parse("09:15 HIT KGX").unwrap();
        let body = board_json(json!([
            { "std": "09:15", "etd": "Delayed", "destination": [{ "crs": "KGX" }] }
        ]));
        let rows = parse_board(&body).unwrap();
        let status = select_service(&rows, &svc).map(|e| e.status(svc.scheduled()));
        assert_eq!(status, Some(ServiceStatus::DelayedUnknownEta));
    }

    #[test]
    fn url_includes_route_and_rows() {
        let board = DarwinBoard::new(DarwinConfig {
            base_url: "https://example.test/".to_string(),
            access_token: None,
            rows: 10,
            timeout: Duration::from_secs(1),
        })
        .unwrap();
        let svc = MonitoredService::parse("09:15 HIT KGX").unwrap();
        assert_eq!(
            board.board_url(&svc),
            "https://example.test/departures/HIT/to/KGX/10"
        );
    }
}
