//! End-to-end reception behavior over the simulated bus: pull
//! sequences, batch collection, and the polling listener.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use canlink::{
    BusEvent, CanBus, CanFilter, CanFrame, EventKind, FrameKind, ListenOptions, StreamOptions,
};
use canlink_transport::{SimBus, TransportError};
use tokio::sync::mpsc;

fn sim() -> (SimBus, CanBus) {
    let (bus, transport) = SimBus::new();
    (bus, CanBus::with_transport(Arc::new(transport)))
}

fn frame(id: u32) -> CanFrame {
    CanFrame::data(id, vec![id as u8]).unwrap()
}

fn fast() -> ListenOptions {
    ListenOptions::default()
        .with_interval(Duration::from_millis(1))
        .with_read_timeout(Duration::from_millis(5))
}

async fn wait_until_idle(bus: &CanBus) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while bus.is_listening() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("listener should release the receive side");
}

#[tokio::test]
async fn frames_yield_in_arrival_order() {
    let (sim, bus) = sim();
    for id in [0x1, 0x2, 0x3] {
        sim.push(frame(id));
    }

    let mut stream = bus
        .frames(StreamOptions::default().with_max_frames(3))
        .unwrap();
    let mut ids = Vec::new();
    while let Some(item) = stream.next().await {
        ids.push(item.unwrap().id);
    }
    assert_eq!(ids, vec![0x1, 0x2, 0x3]);

    // Exhausted stays exhausted.
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn frames_with_id_skips_other_ids_without_counting_them() {
    let (sim, bus) = sim();
    sim.push(frame(0x10)); // X
    sim.push(frame(0x20)); // Y, discarded
    sim.push(frame(0x10)); // X

    let mut stream = bus
        .frames_with_id(0x10, StreamOptions::default().with_max_frames(2))
        .unwrap();
    let first = stream.next().await.unwrap().unwrap();
    let second = stream.next().await.unwrap().unwrap();
    assert_eq!(first.id, 0x10);
    assert_eq!(second.id, 0x10);
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn frames_of_type_never_yields_another_kind() {
    let (sim, bus) = sim();
    sim.push(frame(0x1));
    sim.push(CanFrame::remote(0x2, 4).unwrap());
    sim.push(frame(0x3));
    sim.push(CanFrame::remote(0x4, 0).unwrap());

    let mut stream = bus
        .frames_of_type(FrameKind::Remote, StreamOptions::default().with_max_frames(2))
        .unwrap();
    while let Some(item) = stream.next().await {
        let got = item.unwrap();
        assert_eq!(got.kind(), FrameKind::Remote);
    }
}

#[tokio::test]
async fn implicit_and_caller_filters_both_apply() {
    let (sim, bus) = sim();
    sim.push(CanFrame::data(0x10, &b"\x01"[..]).unwrap()); // wrong payload
    sim.push(CanFrame::data(0x20, &b"\x02"[..]).unwrap()); // wrong id
    sim.push(CanFrame::data(0x10, &b"\x02"[..]).unwrap()); // matches both

    let options = StreamOptions::default()
        .with_max_frames(1)
        .with_filter(|frame: &CanFrame| frame.data.first() == Some(&0x02));
    let mut stream = bus.frames_with_id(0x10, options).unwrap();

    let got = stream.next().await.unwrap().unwrap();
    assert_eq!(got.id, 0x10);
    assert_eq!(got.data.as_ref(), &[0x02]);
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn pull_timeout_before_the_limit_fails_once_then_fuses() {
    let (sim, bus) = sim();
    sim.push(frame(0x1));

    let mut stream = bus
        .frames(
            StreamOptions::default()
                .with_max_frames(3)
                .with_timeout(Duration::from_millis(5)),
        )
        .unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap().id, 0x1);
    let err = stream.next().await.unwrap().unwrap_err();
    assert_eq!(err.code(), "RECEIVE_TIMEOUT");
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn non_timeout_failure_ends_the_sequence() {
    let (sim, bus) = sim();
    sim.fail(TransportError::Io(io::Error::new(
        io::ErrorKind::Other,
        "bus fell over",
    )));

    let mut stream = bus
        .frames(StreamOptions::default().with_max_frames(2))
        .unwrap();
    let err = stream.next().await.unwrap().unwrap_err();
    assert_eq!(err.code(), "TRANSPORT_ERROR");
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn abandoned_stream_issues_no_further_reads() {
    let (sim, bus) = sim();
    sim.push(frame(0x1));
    sim.push(frame(0x2));

    let mut stream = bus.frames(StreamOptions::default()).unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap().id, 0x1);
    drop(stream);

    // The receive side is free again and the unread frame is still
    // on the bus for the next consumer.
    let mut stream = bus
        .frames(StreamOptions::default().with_max_frames(1))
        .unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap().id, 0x2);
}

#[tokio::test]
async fn collect_matches_manual_pulls() {
    let (sim, bus) = sim();
    for id in [0x1, 0x2, 0x3] {
        sim.push(frame(id));
    }
    let collected = bus
        .collect_frames(3, StreamOptions::default())
        .await
        .unwrap();

    for id in [0x1, 0x2, 0x3] {
        sim.push(frame(id));
    }
    let mut stream = bus
        .frames(StreamOptions::default().with_max_frames(3))
        .unwrap();
    let mut manual = Vec::new();
    for _ in 0..3 {
        manual.push(stream.next().await.unwrap().unwrap());
    }

    assert_eq!(collected, manual);
}

#[tokio::test]
async fn collect_is_all_or_nothing() {
    let (sim, bus) = sim();
    sim.push(frame(0x1));
    sim.push(frame(0x2));

    let err = bus
        .collect_frames(
            3,
            StreamOptions::default().with_timeout(Duration::from_millis(5)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "RECEIVE_TIMEOUT");
}

#[tokio::test]
async fn listener_dispatches_frames_and_lifecycle_events_in_order() {
    let (sim, bus) = sim();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel();
    let lifecycle = Arc::new(Mutex::new(Vec::new()));

    bus.on(EventKind::Frame, move |event| {
        if let BusEvent::Frame(frame) = event {
            let _ = frame_tx.send(frame.id);
        }
    });
    for (kind, tag) in [
        (EventKind::Listening, "listening"),
        (EventKind::Stopped, "stopped"),
    ] {
        let lifecycle = Arc::clone(&lifecycle);
        bus.on(kind, move |_| lifecycle.lock().unwrap().push(tag));
    }

    bus.start_listening(fast()).await.unwrap();
    assert!(bus.is_listening());

    sim.push(frame(0xA));
    sim.push(frame(0xB));
    for expected in [0xA, 0xB] {
        let id = tokio::time::timeout(Duration::from_secs(1), frame_rx.recv())
            .await
            .expect("frame should be dispatched")
            .unwrap();
        assert_eq!(id, expected);
    }

    bus.stop_listening().await;
    assert!(!bus.is_listening());
    assert_eq!(*lifecycle.lock().unwrap(), vec!["listening", "stopped"]);

    // Stopping again is a no-op with no event.
    bus.stop_listening().await;
    assert_eq!(*lifecycle.lock().unwrap(), vec!["listening", "stopped"]);
}

#[tokio::test]
async fn second_start_fails_and_leaves_the_first_session_running() {
    let (sim, bus) = sim();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel();
    bus.on(EventKind::Frame, move |event| {
        if let BusEvent::Frame(frame) = event {
            let _ = frame_tx.send(frame.id);
        }
    });

    bus.start_listening(fast()).await.unwrap();
    let err = bus.start_listening(fast()).await.unwrap_err();
    assert_eq!(err.code(), "ALREADY_LISTENING");

    sim.push(frame(0x5));
    let id = tokio::time::timeout(Duration::from_secs(1), frame_rx.recv())
        .await
        .expect("first session should still dispatch")
        .unwrap();
    assert_eq!(id, 0x5);

    bus.stop_listening().await;
}

#[tokio::test]
async fn fatal_read_error_emits_and_stops_the_session() {
    let (sim, bus) = sim();
    let (err_tx, mut err_rx) = mpsc::unbounded_channel();
    let stopped = Arc::new(AtomicUsize::new(0));

    bus.on(EventKind::Error, move |event| {
        if let BusEvent::Error(err) = event {
            let _ = err_tx.send(err.code());
        }
    });
    let stops = Arc::clone(&stopped);
    bus.on(EventKind::Stopped, move |_| {
        stops.fetch_add(1, Ordering::SeqCst);
    });

    bus.start_listening(fast()).await.unwrap();
    sim.fail(TransportError::Io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "controller went away",
    )));

    let code = tokio::time::timeout(Duration::from_secs(1), err_rx.recv())
        .await
        .expect("failure should be dispatched")
        .unwrap();
    assert_eq!(code, "LISTENING_ERROR");

    wait_until_idle(&bus).await;

    // The session tore itself down; stop is a no-op and no `Stopped`
    // event is emitted for a session that already failed.
    bus.stop_listening().await;
    assert_eq!(stopped.load(Ordering::SeqCst), 0);

    // A new session can start afterwards.
    bus.start_listening(fast()).await.unwrap();
    bus.stop_listening().await;
}

#[tokio::test]
async fn read_timeouts_are_silent_ticks() {
    let (sim, bus) = sim();
    let errors = Arc::new(AtomicUsize::new(0));
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel();

    let count = Arc::clone(&errors);
    bus.on(EventKind::Error, move |_| {
        count.fetch_add(1, Ordering::SeqCst);
    });
    bus.on(EventKind::Frame, move |event| {
        if let BusEvent::Frame(frame) = event {
            let _ = frame_tx.send(frame.id);
        }
    });

    bus.start_listening(
        ListenOptions::default()
            .with_interval(Duration::from_millis(1))
            .with_read_timeout(Duration::from_millis(1)),
    )
    .await
    .unwrap();

    // Let a batch of empty ticks elapse.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(errors.load(Ordering::SeqCst), 0);
    assert!(bus.is_listening());

    // The loop is still alive and picks up the next frame.
    sim.push(frame(0x9));
    let id = tokio::time::timeout(Duration::from_secs(1), frame_rx.recv())
        .await
        .expect("loop should still dispatch after empty ticks")
        .unwrap();
    assert_eq!(id, 0x9);

    bus.stop_listening().await;
}

#[tokio::test]
async fn kernel_side_filters_shape_what_the_listener_sees() {
    let (sim, bus) = sim();
    bus.set_filters(&[CanFilter::new(0x100, 0x700)]).unwrap();

    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel();
    bus.on(EventKind::Frame, move |event| {
        if let BusEvent::Frame(frame) = event {
            let _ = frame_tx.send(frame.id);
        }
    });

    bus.start_listening(fast()).await.unwrap();
    sim.push(frame(0x2)); // dropped by the filter
    sim.push(frame(0x123));

    let id = tokio::time::timeout(Duration::from_secs(1), frame_rx.recv())
        .await
        .expect("matching frame should be dispatched")
        .unwrap();
    assert_eq!(id, 0x123);

    bus.stop_listening().await;
}
