pub mod client;
pub mod plant_service;
pub mod server;

pub use client::{AdminLink, PlantClient, Registration};
pub use plant_service::PlantGrpcService;

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use crate::config::PlantDescriptor;
use crate::election::state::{ElectionToken, TokenKind};
use crate::error::{GridError, Result};
use crate::proto;

pub(crate) fn descriptor_to_proto(descriptor: &PlantDescriptor) -> proto::PlantDescriptor {
    proto::PlantDescriptor {
        plant_id: descriptor.plant_id.clone(),
        tiebreak: descriptor.tiebreak,
        address: descriptor.address.clone(),
        port: descriptor.port as u32,
    }
}

pub(crate) fn descriptor_from_proto(descriptor: proto::PlantDescriptor) -> Result<PlantDescriptor> {
    if descriptor.plant_id.is_empty() {
        return Err(GridError::Internal("descriptor without plant id".to_string()));
    }
    let port = u16::try_from(descriptor.port)
        .map_err(|_| GridError::Internal(format!("descriptor port out of range: {}", descriptor.port)))?;
    Ok(PlantDescriptor {
        plant_id: descriptor.plant_id,
        tiebreak: descriptor.tiebreak,
        address: descriptor.address,
        port,
    })
}

pub(crate) fn token_to_proto(token: &ElectionToken) -> proto::ElectionTokenMsg {
    proto::ElectionTokenMsg {
        kind: match token.kind {
            TokenKind::Election => proto::TokenKind::Election as i32,
            TokenKind::Elected => proto::TokenKind::Elected as i32,
        },
        sender_id: token.sender_id.clone(),
        sender_tiebreak: token.sender_tiebreak,
        request_id: token.request_id.to_string(),
        bid_price: token.bid_price,
        amount_kwh: token.amount_kwh,
        sent_at_ms: token.sent_at.timestamp_millis(),
    }
}

pub(crate) fn token_from_proto(msg: proto::ElectionTokenMsg) -> Result<ElectionToken> {
    let kind = match proto::TokenKind::try_from(msg.kind) {
        Ok(proto::TokenKind::Election) => TokenKind::Election,
        Ok(proto::TokenKind::Elected) => TokenKind::Elected,
        _ => return Err(GridError::InvalidToken(format!("unknown token kind {}", msg.kind))),
    };
    let request_id = Uuid::parse_str(&msg.request_id)
        .map_err(|_| GridError::InvalidToken(format!("bad request id {:?}", msg.request_id)))?;
    let sent_at = Utc
        .timestamp_millis_opt(msg.sent_at_ms)
        .single()
        .unwrap_or_else(Utc::now);
    Ok(ElectionToken {
        kind,
        sender_id: msg.sender_id,
        sender_tiebreak: msg.sender_tiebreak,
        request_id,
        bid_price: msg.bid_price,
        amount_kwh: msg.amount_kwh,
        sent_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_through_proto() {
        let token = ElectionToken::opening(
            &PlantDescriptor::new("3", 3, "127.0.0.1", 50053),
            Uuid::new_v4(),
            0.42,
            9000.0,
        );
        let decoded = token_from_proto(token_to_proto(&token)).unwrap();
        assert_eq!(decoded.kind, token.kind);
        assert_eq!(decoded.sender_id, token.sender_id);
        assert_eq!(decoded.sender_tiebreak, token.sender_tiebreak);
        assert_eq!(decoded.request_id, token.request_id);
        assert_eq!(decoded.bid_price, token.bid_price);
    }

    #[test]
    fn token_with_bad_request_id_is_rejected() {
        let mut msg = token_to_proto(&ElectionToken::opening(
            &PlantDescriptor::new("3", 3, "127.0.0.1", 50053),
            Uuid::new_v4(),
            0.42,
            9000.0,
        ));
        msg.request_id = "not-a-uuid".to_string();
        assert!(token_from_proto(msg).is_err());
    }

    #[test]
    fn token_with_unknown_kind_is_rejected() {
        let mut msg = token_to_proto(&ElectionToken::opening(
            &PlantDescriptor::new("3", 3, "127.0.0.1", 50053),
            Uuid::new_v4(),
            0.42,
            9000.0,
        ));
        msg.kind = 0;
        assert!(token_from_proto(msg).is_err());
    }

    #[test]
    fn descriptor_port_range_is_validated() {
        let mut d = descriptor_to_proto(&PlantDescriptor::new("1", 1, "h", 80));
        d.port = 1 << 20;
        assert!(descriptor_from_proto(d).is_err());
    }
}
