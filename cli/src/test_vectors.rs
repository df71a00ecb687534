//! Withdrawal test vectors
//!
//! Fixed inputs with known outputs for the expiry policy, the relayer wire
//! format and the development primitives.

use crate::types::{Field, Proof, ProofPackage, PublicSignals};

/// A package with small, recognisable values in every field
pub(crate) fn sample_package() -> ProofPackage {
    ProofPackage {
        signal: "0x5151".to_string(),
        signal_hash: Field::from(77),
        proof: Proof {
            pi_a: vec![Field::from(1), Field::from(2), Field::one()],
            pi_b: vec![
                vec![Field::from(3), Field::from(4)],
                vec![Field::from(5), Field::from(6)],
            ],
            pi_c: vec![Field::from(7), Field::from(8), Field::one()],
            protocol: "groth16".to_string(),
        },
        public_signals: PublicSignals(vec![Field::from(10), Field::from(11), Field::from(12)]),
        recipient_address: "0x1111111111111111111111111111111111111111".to_string(),
        fee_wei: Field::parse("1500000000000000").unwrap(),
    }
}

#[cfg(test)]
mod expiry_vectors {
    use chrono::{DateTime, Duration, Utc};

    use crate::timer::{next_utc_midnight, Countdown, ExpiryEvent, GateConfig, TimerGate};

    fn at(ts: &str) -> DateTime<Utc> {
        ts.parse().unwrap()
    }

    const MIDNIGHT: GateConfig = GateConfig {
        use_midnight_policy: true,
        fixed_delay_seconds: 30,
    };

    /// Vector 1: deposit at 15:00 expires at the next UTC midnight
    #[test]
    fn test_vector_1_midnight_expiry() {
        let deposit = at("2021-01-01T15:00:00Z");

        assert_eq!(next_utc_midnight(deposit), at("2021-01-02T00:00:00Z"));
    }

    /// Vector 2: observed at 16:00, eight hours remain
    #[test]
    fn test_vector_2_countdown_before_expiry() {
        let gate = TimerGate::new(at("2021-01-01T15:00:00Z"), at("2021-01-01T16:00:00Z"), MIDNIGHT);

        assert!(!gate.is_already_past());
        assert_eq!(gate.expiry(), at("2021-01-02T00:00:00Z"));
        assert_eq!(
            gate.remaining(at("2021-01-01T16:00:00Z")),
            Some(Countdown {
                days: 0,
                hours: 8,
                minutes: 0,
                seconds: 0
            })
        );
    }

    /// Vector 3: observed at 01:00 the next day, already past with no countdown
    #[test]
    fn test_vector_3_already_past() {
        let observed = at("2021-01-02T01:00:00Z");
        let mut gate = TimerGate::new(at("2021-01-01T15:00:00Z"), observed, MIDNIGHT);

        assert!(gate.is_already_past());
        assert!(gate.remaining(observed).is_none());
        assert_eq!(
            gate.tick(observed),
            Some(ExpiryEvent::AlreadyPast {
                expired_at: at("2021-01-02T00:00:00Z")
            })
        );
        assert_eq!(gate.tick(observed + Duration::hours(1)), None);
    }

    /// Vector 4: day and year boundaries
    #[test]
    fn test_vector_4_boundaries() {
        assert_eq!(
            next_utc_midnight(at("2021-01-01T00:00:00Z")),
            at("2021-01-02T00:00:00Z")
        );
        assert_eq!(
            next_utc_midnight(at("2020-12-31T23:59:59Z")),
            at("2021-01-01T00:00:00Z")
        );
        assert_eq!(
            next_utc_midnight(at("2020-02-28T12:00:00Z")),
            at("2020-02-29T00:00:00Z")
        );
        // Offsets are normalised to UTC first
        let offset: DateTime<Utc> = "2021-01-01T22:00:00-05:00".parse().unwrap();
        assert_eq!(next_utc_midnight(offset), at("2021-01-03T00:00:00Z"));
    }

    /// Vector 5: fixed delay counts from observation
    #[test]
    fn test_vector_5_fixed_delay() {
        let config = GateConfig {
            use_midnight_policy: false,
            fixed_delay_seconds: 30,
        };
        let observed = at("2021-01-01T15:00:00Z");
        let mut gate = TimerGate::new(at("2021-01-01T14:59:00Z"), observed, config);

        assert_eq!(gate.expiry(), at("2021-01-01T15:00:30Z"));
        assert_eq!(gate.tick(at("2021-01-01T15:00:29Z")), None);
        assert_eq!(
            gate.tick(at("2021-01-01T15:00:30Z")),
            Some(ExpiryEvent::Reached {
                at: at("2021-01-01T15:00:30Z")
            })
        );
    }

    /// Vector 6: a past midnight wins over the fixed delay
    #[test]
    fn test_vector_6_past_midnight_beats_fixed_delay() {
        let config = GateConfig {
            use_midnight_policy: false,
            fixed_delay_seconds: 30,
        };
        let gate = TimerGate::new(at("2021-01-01T15:00:00Z"), at("2021-01-03T09:00:00Z"), config);

        assert!(gate.is_already_past());
        assert_eq!(gate.expiry(), at("2021-01-02T00:00:00Z"));
    }
}

#[cfg(test)]
mod relayer_vectors {
    use serde_json::json;

    use super::sample_package;
    use crate::error::ErrorKind;
    use crate::orchestrator::{AttemptState, Trigger, TriggerOutcome};
    use crate::relayer::{SubmissionClient, SubmissionError};
    use crate::store::DepositRecordStore;
    use crate::tests::support::{HarnessBuilder, RecordingTransport};
    use crate::timer::Clock;

    /// Vector 7: params are [signal, proof, recipient, fee, publicSignals]
    #[test]
    fn test_vector_7_request_layout() {
        let request = SubmissionClient::build_request(&sample_package(), 42).unwrap();

        assert_eq!(
            request,
            json!({
                "jsonrpc": "2.0",
                "id": 42,
                "method": "mixer_mix",
                "params": [
                    "0x5151",
                    {
                        "pi_a": ["1", "2", "1"],
                        "pi_b": [["3", "4"], ["5", "6"]],
                        "pi_c": ["7", "8", "1"],
                        "protocol": "groth16"
                    },
                    "0x1111111111111111111111111111111111111111",
                    "1500000000000000",
                    ["10", "11", "12"]
                ]
            })
        );
    }

    /// Vector 8: the bare success and pre-broadcast response shapes
    #[test]
    fn test_vector_8_response_shapes() {
        assert_eq!(
            SubmissionClient::interpret(&json!({ "result": { "txHash": "0xabc" } })).unwrap(),
            "0xabc"
        );

        let rejected = SubmissionClient::interpret(&json!({
            "error": { "data": { "name": "BACKEND_MIX_PROOF_PRE_BROADCAST_INVALID" } }
        }))
        .unwrap_err();
        assert!(matches!(rejected, SubmissionError::PreBroadcastCheckFailed));
        assert_eq!(rejected.kind(), ErrorKind::PreBroadcastCheckFailed);
    }

    /// Vector 9: pre-broadcast rejection through the orchestrator
    #[tokio::test]
    async fn test_vector_9_pre_broadcast_scenario() {
        let mut builder = HarnessBuilder::new();
        builder.transport = RecordingTransport::replying(json!({
            "error": { "data": { "name": "BACKEND_MIX_PROOF_PRE_BROADCAST_INVALID" } }
        }));
        let harness = builder.build();
        harness.orchestrator.activate(harness.clock.now());

        let outcome = harness.orchestrator.trigger(Trigger::Manual).await;

        assert_eq!(
            outcome,
            TriggerOutcome::Started(AttemptState::Failed(ErrorKind::PreBroadcastCheckFailed))
        );
        assert_eq!(harness.store.withdrawal_writes(), 0);
        assert!(harness.stored_tx_hash().is_none());
    }

    /// Vector 10: success through the orchestrator
    #[tokio::test]
    async fn test_vector_10_success_scenario() {
        let mut builder = HarnessBuilder::new();
        builder.transport = RecordingTransport::replying(json!({ "result": { "txHash": "0xabc" } }));
        let harness = builder.build();
        harness.orchestrator.activate(harness.clock.now());

        let outcome = harness.orchestrator.trigger(Trigger::Manual).await;

        assert_eq!(
            outcome,
            TriggerOutcome::Started(AttemptState::Succeeded {
                tx_hash: "0xabc".into()
            })
        );
        let id = harness.orchestrator.record().id();
        assert_eq!(
            harness.store.get(&id).unwrap().withdrawal_tx_hash.as_deref(),
            Some("0xabc")
        );
    }
}

#[cfg(test)]
mod primitive_vectors {
    use crate::chain::function_selector;
    use crate::config::{format_ether, parse_ether};
    use crate::crypto::DevPrimitives;
    use crate::primitives::CryptoPrimitives;
    use crate::types::{Field, IdentityKey};

    /// Vector 11: Keccak-256 selectors
    #[test]
    fn test_vector_11_function_selectors() {
        assert_eq!(hex::encode(function_selector("balanceOf(address)")), "70a08231");
        assert_eq!(
            hex::encode(function_selector("transfer(address,uint256)")),
            "a9059cbb"
        );
    }

    /// Vector 12: ether amounts are exact
    #[test]
    fn test_vector_12_ether_amounts() {
        assert_eq!(parse_ether("0.0015").unwrap(), Field::from(1_500_000_000_000_000));
        assert_eq!(parse_ether("1").unwrap(), Field::from(1_000_000_000_000_000_000));
        assert_eq!(format_ether(&Field::from(1_500_000_000_000_000)), "0.0015");
        assert_eq!(format_ether(&Field::zero()), "0");
    }

    /// Vector 13: signal packs recipient, relayer and a 32-byte fee
    #[test]
    fn test_vector_13_signal_layout() {
        let primitives = DevPrimitives::default();
        let signal = primitives
            .compute_signal(
                "0x1111111111111111111111111111111111111111",
                "0x2222222222222222222222222222222222222222",
                &Field::from(255),
            )
            .unwrap();

        let expected = format!(
            "0x{}{}{}ff",
            "11".repeat(20),
            "22".repeat(20),
            "00".repeat(31)
        );
        assert_eq!(signal.signal, expected);
        assert!(signal.signal_hash.bits() <= 248);
    }

    /// Vector 14: identity derivation and signing are deterministic
    #[test]
    fn test_vector_14_deterministic_identity() {
        let primitives = DevPrimitives::default();
        let key = IdentityKey::from_bytes([0x42; 32]);
        let nullifier = Field::from(99);

        let public_key = primitives.derive_public_key(&key).unwrap();
        assert_eq!(public_key, primitives.derive_public_key(&key).unwrap());
        assert_eq!(public_key.0.len(), 32);

        let commitment = primitives
            .derive_identity_commitment(&nullifier, &public_key)
            .unwrap();
        assert_eq!(
            commitment,
            primitives
                .derive_identity_commitment(&nullifier, &public_key)
                .unwrap()
        );

        let first = primitives.sign(&key, &Field::from(1), &Field::from(2)).unwrap();
        let second = primitives.sign(&key, &Field::from(1), &Field::from(2)).unwrap();
        assert_eq!(first.signature, second.signature);
        assert_eq!(first.signature.0.len(), 64);
        assert!(primitives.verify_signature(&first.message, &first.signature, &public_key));
    }
}
