mod common;

use common::{MockSys, Recorder, Seen, associate, drive, drive_until, quiet_config};
use sctp_reactor::sys::{Errno, Received, RcvInfo};
use sctp_reactor::{Error, EventLoop, Message, Phase, ReentrancyGuard};
use std::cell::RefCell;
use std::rc::Rc;

type Outcomes = Rc<RefCell<Vec<Result<(), Error>>>>;

fn recorder_of(outcomes: &Outcomes) -> impl FnOnce(Result<(), Error>) + 'static {
    let outcomes = outcomes.clone();
    move |result| outcomes.borrow_mut().push(result)
}

#[test]
fn test_connect_then_flush_early_writes() {
    let event_loop = EventLoop::new().expect("event loop");
    let sys = MockSys::new();
    let association = associate(&event_loop, &sys, false, quiet_config());
    assert_eq!(association.phase(), Phase::Connecting);

    let (recorder, seen) = Recorder::new(true);
    association.set_handler(recorder);

    let outcomes: Outcomes = Rc::new(RefCell::new(Vec::new()));
    association
        .write(Message::new(b"early".to_vec()), recorder_of(&outcomes))
        .expect("write while connecting");

    drive_until(&event_loop, || outcomes.borrow().len() == 1);

    assert_eq!(*seen.borrow(), vec![Seen::Connect]);
    assert_eq!(*outcomes.borrow(), vec![Ok(())]);
    assert_eq!(sys.sent_payloads(), vec![b"early".to_vec()]);
    assert_eq!(association.phase(), Phase::Established);

    association.destroy(None);
}

#[test]
fn test_refused_connect() {
    let event_loop = EventLoop::new().expect("event loop");
    let sys = MockSys::new();
    sys.state.borrow_mut().pending_error = Some(Errno(libc::ECONNREFUSED));

    let association = associate(&event_loop, &sys, false, quiet_config());
    let fd = association.raw_fd().expect("fd");
    let (recorder, seen) = Recorder::new(true);
    association.set_handler(recorder);

    let outcomes: Outcomes = Rc::new(RefCell::new(Vec::new()));
    association
        .write(Message::new(b"never".to_vec()), recorder_of(&outcomes))
        .expect("write");

    drive_until(&event_loop, || association.is_destroyed());

    assert_eq!(
        *seen.borrow(),
        vec![Seen::Error(Error::ConnectionRefused), Seen::Close]
    );
    assert_eq!(*outcomes.borrow(), vec![Err(Error::ConnectionRefused)]);
    assert!(sys.sent_payloads().is_empty());

    let state = sys.state.borrow();
    assert_eq!(state.lingered, vec![fd], "abortive close");
    assert_eq!(state.closed, vec![fd]);
}

#[test]
fn test_signals_buffered_until_handler() {
    let event_loop = EventLoop::new().expect("event loop");
    let sys = MockSys::new();
    let association = associate(&event_loop, &sys, false, quiet_config());

    drive_until(&event_loop, || association.phase() == Phase::Established);

    let (recorder, seen) = Recorder::new(true);
    association.set_handler(recorder);
    assert_eq!(*seen.borrow(), vec![Seen::Connect]);

    association.destroy(None);
    assert_eq!(*seen.borrow(), vec![Seen::Connect, Seen::Close]);
}

#[test]
fn test_graceful_end() {
    let event_loop = EventLoop::new().expect("event loop");
    let sys = MockSys::new();
    let association = associate(&event_loop, &sys, true, quiet_config());
    let fd = association.raw_fd().expect("fd");
    let (recorder, seen) = Recorder::new(true);
    association.set_handler(recorder);

    let writes: Outcomes = Rc::new(RefCell::new(Vec::new()));
    let ends: Outcomes = Rc::new(RefCell::new(Vec::new()));
    association
        .write(Message::new(b"last".to_vec()), recorder_of(&writes))
        .expect("write");
    association.end(recorder_of(&ends)).expect("end");

    drive_until(&event_loop, || ends.borrow().len() == 1);

    assert_eq!(*writes.borrow(), vec![Ok(())]);
    assert_eq!(*ends.borrow(), vec![Ok(())]);
    assert_eq!(sys.state.borrow().shutdowns, vec![fd]);
    assert_eq!(association.phase(), Phase::LocallyShutdown);

    // a second end after the shutdown completes right away
    association.end(recorder_of(&ends)).expect("end again");
    assert_eq!(*ends.borrow(), vec![Ok(()), Ok(())]);

    sys.push_eof();
    drive_until(&event_loop, || association.is_destroyed());

    assert_eq!(*seen.borrow(), vec![Seen::End, Seen::Close]);
    let state = sys.state.borrow();
    assert!(state.lingered.is_empty(), "graceful close keeps linger");
    assert_eq!(state.closed, vec![fd]);
}

#[test]
fn test_remote_end_ends_local_side() {
    let event_loop = EventLoop::new().expect("event loop");
    let sys = MockSys::new();
    sys.push_eof();

    let association = associate(&event_loop, &sys, true, quiet_config());
    let (recorder, seen) = Recorder::new(true);
    association.set_handler(recorder);
    association.resume().expect("resume");

    drive_until(&event_loop, || association.is_destroyed());

    assert_eq!(*seen.borrow(), vec![Seen::End, Seen::Close]);

    let state = sys.state.borrow();
    assert!(state.shutdowns.is_empty(), "peer already shut down");
    assert!(state.lingered.is_empty());
}

#[test]
fn test_writes_after_remote_end_fail() {
    let event_loop = EventLoop::new().expect("event loop");
    let sys = MockSys::new();
    sys.push_eof();

    let association = associate(&event_loop, &sys, true, quiet_config());
    let outcomes: Outcomes = Rc::new(RefCell::new(Vec::new()));
    association
        .write(Message::new(b"one".to_vec()), recorder_of(&outcomes))
        .expect("write");
    association
        .write(Message::new(b"two".to_vec()), recorder_of(&outcomes))
        .expect("write");
    association.resume().expect("resume");

    drive_until(&event_loop, || association.is_destroyed());

    assert_eq!(
        *outcomes.borrow(),
        vec![Err(Error::BrokenPipe), Err(Error::BrokenPipe)]
    );
    assert!(sys.sent_payloads().is_empty());
}

#[test]
fn test_half_open_waits_for_local_end() {
    let event_loop = EventLoop::new().expect("event loop");
    let sys = MockSys::new();
    sys.push_eof();

    let config = quiet_config().allow_half_open(true);
    let association = associate(&event_loop, &sys, true, config);
    let (recorder, seen) = Recorder::new(true);
    association.set_handler(recorder);
    association.resume().expect("resume");

    drive_until(&event_loop, || !seen.borrow().is_empty());
    drive(&event_loop, 5);

    assert_eq!(*seen.borrow(), vec![Seen::End]);
    assert_eq!(association.phase(), Phase::Ended);

    let ends: Outcomes = Rc::new(RefCell::new(Vec::new()));
    association.end(recorder_of(&ends)).expect("end");
    drive_until(&event_loop, || association.is_destroyed());

    assert_eq!(*ends.borrow(), vec![Ok(())]);
    assert_eq!(*seen.borrow(), vec![Seen::End, Seen::Close]);
    assert!(sys.state.borrow().shutdowns.is_empty());
}

#[test]
fn test_destroy_fails_queued_writes_in_order() {
    let event_loop = EventLoop::new().expect("event loop");
    let sys = MockSys::new();
    let association = associate(&event_loop, &sys, true, quiet_config());
    let fd = association.raw_fd().expect("fd");
    let (recorder, seen) = Recorder::new(true);
    association.set_handler(recorder);

    let order = Rc::new(RefCell::new(Vec::new()));
    for i in 0..3 {
        let order = order.clone();
        association
            .write(Message::new(vec![1u8, 2, 3]), move |result| {
                order.borrow_mut().push((i, result))
            })
            .expect("write");
    }

    association.destroy(None);

    let expected: Vec<(i32, Result<(), Error>)> = (0..3)
        .map(|i| (i, Err(Error::Destroyed { method: "write" })))
        .collect();
    assert_eq!(*order.borrow(), expected);
    assert_eq!(*seen.borrow(), vec![Seen::Close]);
    assert!(sys.sent_payloads().is_empty());

    // idempotent
    association.destroy(Some(Error::ConnectionReset));
    assert_eq!(*seen.borrow(), vec![Seen::Close]);

    let state = sys.state.borrow();
    assert_eq!(state.lingered, vec![fd]);
    assert_eq!(state.closed, vec![fd]);
}

#[test]
fn test_destroy_with_error() {
    let event_loop = EventLoop::new().expect("event loop");
    let sys = MockSys::new();
    let association = associate(&event_loop, &sys, true, quiet_config());
    let (recorder, seen) = Recorder::new(true);
    association.set_handler(recorder);

    let outcomes: Outcomes = Rc::new(RefCell::new(Vec::new()));
    association
        .write(Message::new(b"x".to_vec()), recorder_of(&outcomes))
        .expect("write");
    association.end(recorder_of(&outcomes)).expect("end");

    association.destroy(Some(Error::ConnectionReset));

    assert_eq!(
        *outcomes.borrow(),
        vec![Err(Error::ConnectionReset), Err(Error::ConnectionReset)]
    );
    assert_eq!(
        *seen.borrow(),
        vec![Seen::Error(Error::ConnectionReset), Seen::Close]
    );
}

#[test]
fn test_methods_after_destroy() {
    let event_loop = EventLoop::new().expect("event loop");
    let sys = MockSys::new();
    let association = associate(&event_loop, &sys, true, quiet_config());
    association.destroy(None);

    assert_eq!(association.phase(), Phase::Destroyed);
    assert_eq!(association.raw_fd(), None);
    assert_eq!(
        association.write(Message::new(b"x".to_vec()), |_| {}),
        Err(Error::Destroyed { method: "write" })
    );
    assert_eq!(
        association.end(|_| {}),
        Err(Error::Destroyed { method: "end" })
    );
    assert_eq!(
        association.resume(),
        Err(Error::Destroyed { method: "resume" })
    );
    assert_eq!(
        association.status().err(),
        Some(Error::Destroyed { method: "status" })
    );
    assert_eq!(
        association.address().err(),
        Some(Error::Destroyed { method: "address" })
    );
    assert_eq!(
        association.remote_addresses().err(),
        Some(Error::Destroyed {
            method: "remote_addresses"
        })
    );
    assert_eq!(
        association.set_nodelay(true),
        Err(Error::Destroyed {
            method: "set_nodelay"
        })
    );
}

#[test]
fn test_oversized_message_is_protocol_violation() {
    let event_loop = EventLoop::new().expect("event loop");
    let sys = MockSys::new();
    sys.push_received(
        b"partial",
        Received {
            len: 7,
            end_of_record: false,
            notification: false,
            rcv_info: Some(RcvInfo::default()),
        },
    );

    let association = associate(&event_loop, &sys, true, quiet_config());
    let fd = association.raw_fd().expect("fd");
    let (recorder, seen) = Recorder::new(true);
    association.set_handler(recorder);
    association.resume().expect("resume");

    drive_until(&event_loop, || association.is_destroyed());

    let seen = seen.borrow();
    assert_eq!(seen.len(), 2);
    assert!(matches!(seen[0], Seen::Error(Error::ProtocolViolation(_))));
    assert_eq!(seen[1], Seen::Close);
    assert_eq!(sys.state.borrow().lingered, vec![fd]);
}

#[test]
fn test_data_without_receive_info_is_protocol_violation() {
    let event_loop = EventLoop::new().expect("event loop");
    let sys = MockSys::new();
    sys.push_received(
        b"anonymous",
        Received {
            len: 9,
            end_of_record: true,
            notification: false,
            rcv_info: None,
        },
    );

    let association = associate(&event_loop, &sys, true, quiet_config());
    let (recorder, seen) = Recorder::new(true);
    association.set_handler(recorder);
    association.resume().expect("resume");

    drive_until(&event_loop, || association.is_destroyed());
    assert!(matches!(
        seen.borrow()[0],
        Seen::Error(Error::ProtocolViolation(_))
    ));
}

#[test]
fn test_receive_error_destroys() {
    let event_loop = EventLoop::new().expect("event loop");
    let sys = MockSys::new();
    sys.state
        .borrow_mut()
        .recv
        .push_back(Err(Errno(libc::ECONNRESET)));

    let association = associate(&event_loop, &sys, true, quiet_config());
    let (recorder, seen) = Recorder::new(true);
    association.set_handler(recorder);
    association.resume().expect("resume");

    drive_until(&event_loop, || association.is_destroyed());
    assert_eq!(
        *seen.borrow(),
        vec![Seen::Error(Error::ConnectionReset), Seen::Close]
    );
}

#[test]
fn test_loop_exits_once_association_idle() {
    let event_loop = EventLoop::new().expect("event loop");
    let sys = MockSys::new();
    let association = associate(&event_loop, &sys, true, quiet_config());

    // not reading, nothing queued: nothing keeps the loop running
    event_loop.run().expect("run");
    assert_eq!(association.phase(), Phase::Established);

    association.destroy(None);
}

#[test]
fn test_association_outlives_dropped_handle() {
    let event_loop = EventLoop::new().expect("event loop");
    let sys = MockSys::new();
    let association = associate(&event_loop, &sys, true, quiet_config());

    let done = Rc::new(RefCell::new(Vec::new()));
    let sink = done.clone();
    let observed = sys.clone();
    let keeper = association.clone();
    association
        .write(Message::new("orphan"), move |result| {
            let closed = observed.state.borrow().closed.len();
            sink.borrow_mut().push((result, closed));
            keeper.destroy(None);
        })
        .expect("write");
    drop(association);

    drive_until(&event_loop, || !done.borrow().is_empty());

    assert_eq!(*done.borrow(), vec![(Ok(()), 0)], "still open when the write completed");
    assert_eq!(sys.sent_payloads(), vec![b"orphan".to_vec()]);
    assert_eq!(sys.state.borrow().closed.len(), 1);
}

#[test]
#[should_panic(expected = "reentrant call detected")]
fn test_reentrancy_guard_panics() {
    let guard = ReentrancyGuard::new();
    let _outer = guard.enter();
    let _inner = guard.enter();
}

#[test]
fn test_reentrancy_guard_released() {
    let guard = ReentrancyGuard::new();
    {
        let _entered = guard.enter();
        assert!(guard.is_active());
    }
    assert!(!guard.is_active());
    let _again = guard.enter();
}
