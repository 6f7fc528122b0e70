//! Decode demo
//!
//! Simulates two independent SACD/DST decoder pipelines sharing one worker
//! pool: each `ProcessQueue` stands in for one stream, and each dispatched
//! job stands in for decoding one audio frame. Frame decode times are
//! jittered on purpose so the demo prints results back in strict frame
//! order even though the workers actually finish them out of order.

use dstpool::{DispatchConfig, Pool};
use std::any::Any;
use std::time::{Duration, Instant};

struct DecodedFrame {
    stream: &'static str,
    frame_no: u32,
    samples: usize,
}

fn job_fn<F>(f: F) -> dstpool::JobFn
where
    F: FnOnce() -> Box<dyn Any + Send> + Send + 'static,
{
    Box::new(f)
}

fn decode_one(stream: &'static str, frame_no: u32) -> dstpool::JobFn {
    job_fn(move || {
        // fake decode cost: jitter stands in for the variable bitrate of a
        // real DST frame.
        let jitter_ms = 5 + (frame_no as u64 * 37) % 60;
        std::thread::sleep(Duration::from_millis(jitter_ms));
        Box::new(DecodedFrame {
            stream,
            frame_no,
            samples: 2048,
        })
    })
}

fn main() {
    println!("=== dstpool decode demo ===\n");

    let config = DispatchConfig::default().num_workers(4).debug_logging(false);
    let pool = Pool::with_config(config).expect("pool starts");

    let stream_a = pool.new_queue(8, false).expect("queue attaches");
    let stream_b = pool.new_queue(8, false).expect("queue attaches");

    const FRAMES_PER_STREAM: u32 = 12;

    println!("dispatching {FRAMES_PER_STREAM} frames to each of 2 streams...\n");
    let start = Instant::now();
    for frame_no in 0..FRAMES_PER_STREAM {
        stream_a
            .dispatch(decode_one("A", frame_no))
            .expect("stream A accepts frame");
        stream_b
            .dispatch(decode_one("B", frame_no))
            .expect("stream B accepts frame");
    }

    for frame_no in 0..FRAMES_PER_STREAM {
        let result = stream_a.next_result_wait().expect("stream A still running");
        let frame = result.downcast::<DecodedFrame>().expect("decoded frame");
        assert_eq!(frame.frame_no, frame_no);
        println!(
            "[{}] frame {:02} decoded ({} samples)",
            frame.stream, frame.frame_no, frame.samples
        );

        let result = stream_b.next_result_wait().expect("stream B still running");
        let frame = result.downcast::<DecodedFrame>().expect("decoded frame");
        assert_eq!(frame.frame_no, frame_no);
        println!(
            "[{}] frame {:02} decoded ({} samples)",
            frame.stream, frame.frame_no, frame.samples
        );
    }

    println!("\nall frames delivered in order in {:?}", start.elapsed());

    stream_a.destroy();
    stream_b.destroy();
    pool.destroy();

    println!("\n=== demo complete ===");
}
