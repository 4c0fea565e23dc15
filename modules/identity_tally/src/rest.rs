use crate::tally::IdentityTally;
use anyhow::Result;
use provenance_common::{messages::RESTResponse, Role};
use std::sync::Arc;

/// Handles /identities and /identities/{role}
pub async fn handle_identities(
    tally: Arc<IdentityTally>,
    params: Vec<String>,
) -> Result<RESTResponse> {
    let records = match params.first() {
        None => tally.all(),
        Some(role) => match role.parse::<Role>() {
            Ok(role) => tally.ranking(role),
            Err(e) => return Ok(RESTResponse::with_text(400, &e)),
        },
    };

    let json = match serde_json::to_string(&records) {
        Ok(j) => j,
        Err(e) => {
            return Ok(RESTResponse::with_text(
                500,
                &format!("Internal server error while retrieving identities: {e}"),
            ));
        }
    };
    Ok(RESTResponse::with_json(200, &json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use provenance_common::Identity;

    fn tally() -> Arc<IdentityTally> {
        let tally = IdentityTally::new();
        tally.record(
            Identity::new(Role::Orderer, "orderer0.example.com", "01AB", vec![1]),
            Some(42),
        );
        tally.record(Identity::new(Role::Peer, "peer0.org1.example.com", "1001", vec![2]), None);
        Arc::new(tally)
    }

    #[tokio::test]
    async fn lists_every_identity() {
        let response = handle_identities(tally(), vec![]).await.unwrap();
        assert_eq!(response.code, 200);

        let body: serde_json::Value = serde_json::from_str(&response.body).unwrap();
        let records = body.as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["role"], "orderer");
        assert_eq!(records[0]["serial_number"], "01AB");
        assert_eq!(records[0]["last_block"], 42);
        assert_eq!(records[1]["common_name"], "peer0.org1.example.com");
    }

    #[tokio::test]
    async fn filters_by_role() {
        let response = handle_identities(tally(), vec!["peer".to_string()]).await.unwrap();
        assert_eq!(response.code, 200);

        let body: serde_json::Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["role"], "peer");
    }

    #[tokio::test]
    async fn unknown_role_is_bad_request() {
        let response = handle_identities(tally(), vec!["client".to_string()]).await.unwrap();
        assert_eq!(response.code, 400);
    }
}
