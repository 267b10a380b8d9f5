// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Test parameters
#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure
#![allow(clippy::too_many_lines)] // Example/test code

//! Dispatch ordering integration tests
//!
//! Per-direction FIFO under randomised bursts, notification order within one
//! packet, and injection bypassing the queues.

use packetgate::{
    Direction, PacketError, PacketEvent, PacketReader, PacketSink, Pipeline, WaitPredicate,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Fixed 0x22 packet carrying a u32 sequence number.
fn sequenced(seq: u32) -> Vec<u8> {
    let mut packet = vec![0x22];
    packet.extend_from_slice(&seq.to_be_bytes());
    packet
}

fn record_sequence(pipeline: &Pipeline, direction: Direction) -> Arc<Mutex<Vec<u32>>> {
    let order = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&order);
    pipeline.register_handler_with_length(
        0x22,
        direction,
        5,
        move |r: &mut PacketReader<'_>| -> Result<(), PacketError> {
            log.lock().push(r.read_u32()?);
            Ok(())
        },
    );
    order
}

#[test]
fn test_random_bursts_keep_arrival_order() {
    let pipeline = Pipeline::start().expect("pipeline");
    let incoming = record_sequence(&pipeline, Direction::Incoming);

    let mut rng = fastrand::Rng::with_seed(0x5EED);
    let mut seq = 0u32;
    for _ in 0..50 {
        for _ in 0..rng.usize(1..64) {
            let packet = sequenced(seq);
            pipeline.on_receive(&packet, packet.len());
            seq += 1;
        }
        if rng.bool() {
            thread::sleep(Duration::from_micros(rng.u64(0..500)));
        }
    }

    pipeline.shutdown().expect("shutdown");
    let order = incoming.lock();
    assert_eq!(order.len(), seq as usize);
    assert!(
        order.windows(2).all(|w| w[0] < w[1]),
        "out of order dispatch"
    );
}

#[test]
fn test_directions_are_independent_queues() {
    let pipeline = Arc::new(Pipeline::start().expect("pipeline"));
    let incoming = record_sequence(&pipeline, Direction::Incoming);
    let outgoing = record_sequence(&pipeline, Direction::Outgoing);

    let receiver = {
        let pipeline = Arc::clone(&pipeline);
        thread::spawn(move || {
            for seq in 0..500 {
                let packet = sequenced(seq);
                pipeline.on_receive(&packet, packet.len());
            }
        })
    };
    for seq in 1000..1500 {
        let packet = sequenced(seq);
        pipeline.on_send(&packet, packet.len());
    }
    receiver.join().expect("receiver");

    pipeline.shutdown().expect("shutdown");
    assert_eq!(*incoming.lock(), (0..500).collect::<Vec<_>>());
    assert_eq!(*outgoing.lock(), (1000..1500).collect::<Vec<_>>());
}

#[test]
fn test_observer_then_handler_then_waiter() {
    let pipeline = Pipeline::start().expect("pipeline");
    let steps = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&steps);
    pipeline.subscribe(move |event: &PacketEvent| {
        if let PacketEvent::Received(_) = event {
            log.lock().push("observed");
        }
    });
    let log = Arc::clone(&steps);
    pipeline.register_handler_with_length(
        0x22,
        Direction::Incoming,
        5,
        move |_: &mut PacketReader<'_>| -> Result<(), PacketError> {
            log.lock().push("handled");
            Ok(())
        },
    );
    let log = Arc::clone(&steps);
    let waiter = pipeline
        .register_waiter_with_action(
            Direction::Incoming,
            WaitPredicate::new(0x22),
            true,
            move |_| log.lock().push("waiter"),
        )
        .expect("register");

    let packet = sequenced(1);
    pipeline.on_receive(&packet, packet.len());
    assert!(pipeline.wait(&waiter, Duration::from_secs(2)).is_matched());
    pipeline.shutdown().expect("shutdown");

    assert_eq!(*steps.lock(), vec!["observed", "handled", "waiter"]);
}

#[test]
fn test_handler_error_does_not_stall_queue() {
    let pipeline = Pipeline::start().expect("pipeline");
    let seen = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&seen);
    pipeline.register_handler_with_length(
        0x22,
        Direction::Incoming,
        5,
        move |r: &mut PacketReader<'_>| -> Result<(), PacketError> {
            let seq = r.read_u32()?;
            if seq == 1 {
                panic!("handler fault");
            }
            log.lock().push(seq);
            Ok(())
        },
    );

    // truncated packet makes read_u32 fail
    pipeline.on_receive(&[0x22, 0x00], 2);
    for seq in 0..3 {
        let packet = sequenced(seq);
        pipeline.on_receive(&packet, packet.len());
    }
    pipeline.shutdown().expect("shutdown");

    assert_eq!(*seen.lock(), vec![0, 2]);
    let metrics = pipeline.metrics();
    assert_eq!(metrics.handler_errors, 1);
    assert_eq!(metrics.callback_panics, 1);
    assert_eq!(metrics.dispatched_incoming, 4);
}

#[derive(Default)]
struct CaptureSink {
    to_server: Mutex<Vec<Vec<u8>>>,
}

struct SharedCaptureSink(Arc<CaptureSink>);

impl PacketSink for SharedCaptureSink {
    fn send_to_server(&self, packet: &[u8]) {
        self.0.to_server.lock().push(packet.to_vec());
    }

    fn send_to_client(&self, _packet: &[u8]) {}
}

#[test]
fn test_injection_bypasses_filters_and_dispatch() {
    let sink = Arc::new(CaptureSink::default());
    let pipeline = Pipeline::builder()
        .sink(SharedCaptureSink(Arc::clone(&sink)))
        .build()
        .expect("pipeline");
    let dispatched = record_sequence(&pipeline, Direction::Outgoing);
    pipeline.add_filter(Direction::Outgoing, packetgate::FilterRule::new(0x22));

    let events = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&events);
    pipeline.subscribe(move |event: &PacketEvent| log.lock().push(event.name()));

    pipeline.send_to_server(&sequenced(7)).expect("inject");
    pipeline.shutdown().expect("shutdown");

    assert_eq!(*sink.to_server.lock(), vec![sequenced(7)]);
    assert!(dispatched.lock().is_empty());
    assert_eq!(*events.lock(), vec!["injected-to-server"]);
    assert_eq!(pipeline.metrics().filtered_outgoing, 0);
}
