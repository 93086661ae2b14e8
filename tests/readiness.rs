use sctp_reactor::EventLoop;
use sctp_reactor::reactor::{Interest, ReadinessEvent};
use std::cell::RefCell;
use std::rc::Rc;

fn eventfd(initial: u32) -> i32 {
    let fd = unsafe { libc::eventfd(initial, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
    assert!(fd >= 0, "eventfd failed");
    fd
}

#[test]
fn test_subscription_starts_disarmed() {
    let event_loop = EventLoop::new().expect("event loop");
    let fd = eventfd(1);
    let events = Rc::new(RefCell::new(Vec::new()));

    let sink = events.clone();
    let readiness = event_loop
        .handle()
        .subscribe(fd, move |event| sink.borrow_mut().push(event));
    assert_eq!(readiness.interest(), Interest::NONE);

    // nothing armed, so the loop has no work
    event_loop.run().expect("run");
    assert!(events.borrow().is_empty());

    drop(readiness);
    unsafe { libc::close(fd) };
}

#[test]
fn test_readable_event_delivered() {
    let event_loop = EventLoop::new().expect("event loop");
    let fd = eventfd(1);
    let events: Rc<RefCell<Vec<ReadinessEvent>>> = Rc::new(RefCell::new(Vec::new()));

    let sink = events.clone();
    let mut readiness = event_loop
        .handle()
        .subscribe(fd, move |event| sink.borrow_mut().push(event));
    readiness
        .set_interest(Interest::READABLE)
        .expect("set_interest");

    assert!(event_loop.run_once().expect("turn"));

    let events = events.borrow();
    assert_eq!(events.len(), 1);
    assert!(events[0].readable);
    assert!(!events[0].writable, "writability was not requested");
    assert_eq!(events[0].status, 0);

    drop(events);
    readiness.close();
    unsafe { libc::close(fd) };
}

#[test]
fn test_set_interest_is_idempotent() {
    let event_loop = EventLoop::new().expect("event loop");
    let fd = eventfd(0);

    let mut readiness = event_loop.handle().subscribe(fd, |_| {});
    readiness.set_interest(Interest::BOTH).expect("arm");
    readiness.set_interest(Interest::BOTH).expect("same mask again");
    readiness
        .set_interest(Interest::WRITABLE)
        .expect("narrow mask");
    assert_eq!(readiness.interest(), Interest::WRITABLE);

    readiness.set_interest(Interest::NONE).expect("disarm");
    readiness.set_interest(Interest::NONE).expect("disarm again");

    // disarmed subscriptions do not keep the loop alive
    assert!(!event_loop.run_once().expect("turn"));

    readiness.close();
    unsafe { libc::close(fd) };
}

#[test]
fn test_close_is_idempotent_and_final() {
    let event_loop = EventLoop::new().expect("event loop");
    let fd = eventfd(1);
    let count = Rc::new(RefCell::new(0));

    let counter = count.clone();
    let mut readiness = event_loop
        .handle()
        .subscribe(fd, move |_| *counter.borrow_mut() += 1);
    readiness.set_interest(Interest::READABLE).expect("arm");

    readiness.close();
    readiness.close();
    assert!(readiness.is_closed());

    readiness
        .set_interest(Interest::READABLE)
        .expect("no-op after close");
    event_loop.run().expect("run");

    assert_eq!(*count.borrow(), 0);
    unsafe { libc::close(fd) };
}

#[test]
fn test_level_triggered_until_drained() {
    let event_loop = EventLoop::new().expect("event loop");
    let fd = eventfd(3);
    let count = Rc::new(RefCell::new(0));

    let counter = count.clone();
    let mut readiness = event_loop.handle().subscribe(fd, move |_| {
        *counter.borrow_mut() += 1;
    });
    readiness.set_interest(Interest::READABLE).expect("arm");

    event_loop.run_once().expect("turn");
    event_loop.run_once().expect("turn");
    assert_eq!(*count.borrow(), 2, "still readable, reported every turn");

    let mut value = 0u64;
    let read = unsafe { libc::read(fd, &mut value as *mut u64 as *mut libc::c_void, 8) };
    assert_eq!(read, 8);

    event_loop.run_once().expect("turn");
    assert_eq!(*count.borrow(), 2, "drained descriptor is quiet");

    readiness.close();
    unsafe { libc::close(fd) };
}
