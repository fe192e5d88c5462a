//! Integration tests for the session state machine driven through its public
//! API, the way the polling loop drives it.
//!
//! Each test replays a scripted sequence of gateway answers one tick at a
//! time and checks the invariants that matter to the user:
//!
//! - the session reaches exactly one terminal state,
//! - it reaches it on the expected tick,
//! - nothing changes after that, however many ticks follow.

use wa_pairing_core::{
    ConnectionSession, CreatedSession, PairingImage, SessionId, SessionState, SessionStatus,
    TickDecision,
};

/// One scripted gateway answer for a polling tick.
#[derive(Clone, Copy)]
enum Answer {
    Waiting,
    Linked,
    Failed,
}

fn ready_session(max_attempts: u32) -> ConnectionSession {
    let mut session = ConnectionSession::new(max_attempts);
    session.mark_pairing_ready(CreatedSession {
        session_id: SessionId::new("session-1"),
        pairing_image: PairingImage::new("qr"),
    });
    session
}

/// Drives `session` for `ticks` ticks, answering queries from `script`
/// (cycled).  Returns the tick number at which the session became terminal
/// and the number of gateway queries issued.
fn drive(session: &mut ConnectionSession, script: &[Answer], ticks: u32) -> (Option<u32>, u32) {
    let mut terminal_at = None;
    let mut queries = 0u32;

    for tick in 1..=ticks {
        let decision = session.begin_tick();
        if let TickDecision::Query(_) = decision {
            let answer = script[(queries as usize) % script.len()];
            queries += 1;
            match answer {
                Answer::Waiting => {
                    session.record_status(SessionStatus { connected: false });
                }
                Answer::Linked => {
                    session.record_status(SessionStatus { connected: true });
                }
                // A failed query leaves the session untouched.
                Answer::Failed => {}
            }
        }

        if session.is_terminal() && terminal_at.is_none() {
            terminal_at = Some(tick);
        }
    }

    (terminal_at, queries)
}

#[test]
fn test_linked_on_nth_query_connects_on_nth_tick() {
    for n in 1..30u32 {
        // Arrange: n-1 waiting answers followed by a linked one
        let mut script = vec![Answer::Waiting; (n - 1) as usize];
        script.push(Answer::Linked);
        let mut session = ready_session(30);

        // Act
        let (terminal_at, queries) = drive(&mut session, &script, 100);

        // Assert
        assert_eq!(session.state(), SessionState::Connected, "n = {n}");
        assert_eq!(terminal_at, Some(n), "n = {n}");
        assert_eq!(queries, n, "no query may follow the connected one");
    }
}

#[test]
fn test_never_linked_times_out_after_exactly_max_attempts_ticks() {
    let mut session = ready_session(30);

    let (terminal_at, queries) = drive(&mut session, &[Answer::Waiting], 100);

    assert_eq!(session.state(), SessionState::Timeout);
    assert_eq!(terminal_at, Some(30));
    // The budget-exhausting tick does not query the gateway.
    assert_eq!(queries, 29);
    assert_eq!(session.attempt(), 30);
}

#[test]
fn test_alternating_failures_do_not_abort_polling() {
    // Failed, Waiting, Failed, Waiting, ... never linked
    let mut session = ready_session(10);
    let (terminal_at, _) = drive(&mut session, &[Answer::Failed, Answer::Waiting], 50);
    assert_eq!(session.state(), SessionState::Timeout);
    assert_eq!(terminal_at, Some(10));

    // Failed, Linked: connects on the second query
    let mut session = ready_session(10);
    let (terminal_at, _) = drive(&mut session, &[Answer::Failed, Answer::Linked], 50);
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(terminal_at, Some(2));
}

#[test]
fn test_terminal_state_is_stable_for_any_later_tick_sequence() {
    let scripts: [&[Answer]; 4] = [
        &[Answer::Linked],
        &[Answer::Waiting],
        &[Answer::Failed],
        &[Answer::Waiting, Answer::Failed, Answer::Linked],
    ];

    for script in scripts {
        let mut session = ready_session(5);
        drive(&mut session, script, 10);
        assert!(session.is_terminal());
        let frozen = session.clone();

        // Keep ticking with a script that would connect immediately.
        let (_, queries) = drive(&mut session, &[Answer::Linked], 10);

        assert_eq!(queries, 0, "terminal session must never query again");
        assert_eq!(session, frozen);
    }
}
