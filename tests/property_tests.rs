mod common;

use common::{Step, hello, peer_address, session, steps};
use tls_socket_wrapper::{Error, Timeout};

use proptest::prelude::*;

// Strategy for generating millisecond timeout values
fn timeout_millis() -> impl Strategy<Value = i32> {
    prop_oneof![
        Just(-1),
        Just(0),
        i32::MIN..0,
        1..i32::MAX,
    ]
}

// Strategy for generating the number of stalls before the server answers
fn pending_steps() -> impl Strategy<Value = usize> {
    0..8usize
}

// Strategy for generating payloads
fn payloads() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..512)
}

proptest! {
    #[test]
    fn test_timeout_millis_normalization(ms in timeout_millis()) {
        let timeout = Timeout::from_millis(ms);
        let expected = if ms < 0 { -1 } else { ms };
        prop_assert_eq!(timeout.as_millis(), expected);
        prop_assert_eq!(Timeout::from_millis(timeout.as_millis()), timeout);
        prop_assert_eq!(timeout.is_blocking(), ms != 0);
    }

    #[test]
    fn test_blocking_handshake_consumes_every_event(k in pending_steps()) {
        let mut script = vec![Step::WouldBlock; k];
        script.push(hello());
        let (mut session, probe) = session(script, Timeout::Infinite);

        prop_assert!(session.connect(peer_address()).is_ok());
        prop_assert_eq!(session.readiness().event_count(), k as u64);
        prop_assert_eq!(steps(&session), k + 1);
        prop_assert_eq!(probe.count("connect"), 1);
    }

    #[test]
    fn test_non_blocking_handshake_one_step_per_call(k in pending_steps()) {
        let mut script = vec![Step::Stall; k];
        script.push(hello());
        let (mut session, _probe) = session(script, Timeout::Immediate);

        let mut results = Vec::new();
        let completion = loop {
            match session.connect(peer_address()) {
                Err(e @ (Error::InProgress | Error::Already)) => results.push(e),
                other => break other,
            }
            prop_assert!(results.len() <= k);
        };

        // Only a first call that completes reports plain success.
        if k == 0 {
            prop_assert!(completion.is_ok());
        } else {
            prop_assert!(matches!(completion, Err(Error::IsConnected)));
        }
        prop_assert_eq!(results.len(), k);
        prop_assert_eq!(steps(&session), k + 1);
        if let Some((first, rest)) = results.split_first() {
            prop_assert!(matches!(first, Error::InProgress));
            prop_assert!(rest.iter().all(|e| matches!(e, Error::Already)));
        }
    }

    #[test]
    fn test_send_drives_pending_handshake(k in 1..8usize, data in payloads()) {
        let mut script = vec![Step::Stall; k];
        script.push(hello());
        let (mut session, probe) = session(script, Timeout::Immediate);
        prop_assert!(matches!(session.connect(peer_address()), Err(Error::InProgress)));

        let mut blocked = 0;
        let sent = loop {
            match session.send(&data) {
                Ok(size) => break size,
                Err(Error::WouldBlock) => blocked += 1,
                Err(e) => return Err(TestCaseError::fail(e.to_string())),
            }
            prop_assert!(blocked < k);
        };

        prop_assert_eq!(blocked, k - 1);
        prop_assert_eq!(sent, data.len());
        prop_assert_eq!(&probe.sent.lock()[..], &data[..]);
    }
}
