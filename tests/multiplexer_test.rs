//! Multiplexer behaviour over FIFOs standing in for ZIO char devices.
//!
//! A FIFO with an open writer and no data polls as not ready, which is
//! exactly how an idle channel looks.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tempfile::TempDir;
use zio::{ChannelInterface, ControlRecord, Direction, Multiplexer, Samples, ZioError};

fn mkfifo(path: &Path) {
    let c_path = CString::new(path.as_os_str().as_bytes()).unwrap();
    // SAFETY: c_path is a valid NUL-terminated string for the call duration.
    #[allow(unsafe_code)]
    let ret = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    assert_eq!(ret, 0, "mkfifo {}", path.display());
}

/// A fake channel: the interface plus the writer ends of its two FIFOs.
struct FakeChannel {
    channel: Arc<Mutex<ChannelInterface>>,
    ctrl_writer: File,
    data_writer: File,
}

impl FakeChannel {
    fn new(dir: &Path, devname: &str) -> Self {
        let ctrl = dir.join(format!("{devname}-ctrl"));
        let data = dir.join(format!("{devname}-data"));
        mkfifo(&ctrl);
        mkfifo(&data);
        // O_RDWR never blocks on Linux and keeps the FIFO from reporting hangup
        let open = |p: &Path| OpenOptions::new().read(true).write(true).open(p).unwrap();
        Self {
            ctrl_writer: open(&ctrl),
            data_writer: open(&data),
            channel: Arc::new(Mutex::new(ChannelInterface::new(
                devname,
                Direction::Input,
                dir,
            ))),
        }
    }

    fn push_block(&mut self, seq: u32, samples: &[u16]) -> ControlRecord {
        let ctrl = ControlRecord {
            sequence_number: seq,
            sample_size: 2,
            sample_count: samples.len() as u32,
            ..Default::default()
        };
        self.ctrl_writer.write_all(&ctrl.encode()).unwrap();
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_ne_bytes()).collect();
        self.data_writer.write_all(&bytes).unwrap();
        ctrl
    }
}

fn three_channels(dir: &TempDir) -> Vec<FakeChannel> {
    (0..3)
        .map(|i| FakeChannel::new(dir.path(), &format!("zzero-0000-0-{i}")))
        .collect()
}

#[test]
fn test_one_ready_of_three_yields_one_pair() {
    let dir = TempDir::new().unwrap();
    let mut fakes = three_channels(&dir);
    let channels: Vec<_> = fakes.iter().map(|f| f.channel.clone()).collect();

    let mut mux = Multiplexer::new();
    assert_eq!(mux.register(&channels, Some(Direction::Input)).unwrap(), 3);

    let ctrl = fakes[1].push_block(5, &[1, 2, 3, 4]);
    let ready = mux.wait_cycle(Some(Duration::from_secs(2))).unwrap();
    assert_eq!(ready.len(), 1);
    assert!(Arc::ptr_eq(&ready[0].channel, &channels[1]));

    let block = ready[0].block.as_ref().unwrap();
    assert_eq!(block.control.as_ref(), Some(&ctrl));
    assert_eq!(block.samples(), Some(&Samples::U16(vec![1, 2, 3, 4])));

    // drained: the next cycle times out empty
    let idle = mux.wait_cycle(Some(Duration::from_millis(50))).unwrap();
    assert!(idle.is_empty());
}

#[test]
fn test_ready_pairs_follow_registration_order() {
    let dir = TempDir::new().unwrap();
    let mut fakes = three_channels(&dir);
    let channels: Vec<_> = fakes.iter().map(|f| f.channel.clone()).collect();

    let mut mux = Multiplexer::new();
    mux.register(&channels, None).unwrap();

    fakes[2].push_block(1, &[9]);
    fakes[0].push_block(2, &[8]);
    let ready = mux.wait_cycle(Some(Duration::from_secs(2))).unwrap();
    let order: Vec<u32> = ready
        .iter()
        .map(|r| r.block.as_ref().unwrap().control.as_ref().unwrap().sequence_number)
        .collect();
    assert_eq!(order, vec![2, 1]);
}

#[test]
fn test_next_ready_skips_idle_cycles() {
    let dir = TempDir::new().unwrap();
    let mut fakes = three_channels(&dir);
    let channels: Vec<_> = fakes.iter().map(|f| f.channel.clone()).collect();

    let mut mux = Multiplexer::new();
    mux.register(&channels, None).unwrap();

    fakes[0].push_block(10, &[1]);
    fakes[2].push_block(11, &[2]);

    let pairs: Vec<_> = mux
        .next_ready(Some(Duration::from_millis(20)))
        .take(2)
        .map(Result::unwrap)
        .collect();
    assert!(Arc::ptr_eq(&pairs[0].0, &channels[0]));
    assert!(Arc::ptr_eq(&pairs[1].0, &channels[2]));
}

#[test]
fn test_closed_channel_is_skipped() {
    let dir = TempDir::new().unwrap();
    let mut fakes = three_channels(&dir);
    let channels: Vec<_> = fakes.iter().map(|f| f.channel.clone()).collect();

    let mut mux = Multiplexer::new();
    mux.register(&channels, None).unwrap();

    fakes[1].push_block(1, &[1]);
    channels[1].lock().close_both();
    let ready = mux.wait_cycle(Some(Duration::from_millis(50))).unwrap();
    assert!(ready.is_empty());
    assert_eq!(mux.len(), 2);
}

#[test]
fn test_all_channels_dropped() {
    let dir = TempDir::new().unwrap();
    let fakes = three_channels(&dir);
    let mut mux = Multiplexer::new();
    {
        let channels: Vec<_> = fakes.iter().map(|f| f.channel.clone()).collect();
        mux.register(&channels, None).unwrap();
    }
    drop(fakes);

    assert!(matches!(
        mux.wait_cycle(Some(Duration::ZERO)),
        Err(ZioError::NoChannelsRegistered)
    ));
}

#[test]
fn test_direction_filter_excludes_output() {
    let dir = TempDir::new().unwrap();
    let fake = FakeChannel::new(dir.path(), "zzero-0000-1-0");
    let output = Arc::new(Mutex::new(ChannelInterface::new(
        "zzero-0000-1-0",
        Direction::Output,
        dir.path(),
    )));

    let mut mux = Multiplexer::new();
    assert_eq!(mux.register(&[output], Some(Direction::Input)).unwrap(), 0);
    assert_eq!(mux.register(&[fake.channel.clone()], Some(Direction::Output)).unwrap(), 0);
    assert!(mux.is_empty());
}

#[test]
fn test_output_only_channels_are_never_waited_on() {
    let dir = TempDir::new().unwrap();
    File::create(dir.path().join("zzero-0000-1-0-ctrl")).unwrap();
    File::create(dir.path().join("zzero-0000-1-0-data")).unwrap();
    let output = Arc::new(Mutex::new(ChannelInterface::new(
        "zzero-0000-1-0",
        Direction::Output,
        dir.path(),
    )));

    let mut mux = Multiplexer::new();
    assert_eq!(mux.register(&[output.clone()], None).unwrap(), 0);
    assert!(matches!(
        mux.wait_cycle(None),
        Err(ZioError::NoChannelsRegistered)
    ));
    let mut iter = mux.next_ready(None);
    assert!(matches!(iter.next(), Some(Err(ZioError::NoChannelsRegistered))));
    assert!(iter.next().is_none());
}

#[test]
fn test_hung_up_channel_is_read_once_then_dropped() {
    let dir = TempDir::new().unwrap();
    let mut fakes = three_channels(&dir);
    let channels: Vec<_> = fakes.iter().map(|f| f.channel.clone()).collect();

    let mut mux = Multiplexer::new();
    mux.register(&channels, None).unwrap();

    // last writer of chan 0's control FIFO goes away
    let FakeChannel {
        ctrl_writer,
        data_writer: _data_writer,
        ..
    } = fakes.remove(0);
    drop(ctrl_writer);

    let start = Instant::now();
    let ready = mux.wait_cycle(Some(Duration::from_secs(5))).unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(ready.len(), 1);
    assert!(Arc::ptr_eq(&ready[0].channel, &channels[0]));
    assert!(ready[0].block.as_ref().unwrap_err().is_malformed());
    assert_eq!(mux.len(), 2);

    // the survivors still deliver, and idle cycles wait out their timeout
    let ctrl = fakes[0].push_block(3, &[7]);
    let ready = mux.wait_cycle(Some(Duration::from_secs(2))).unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].block.as_ref().unwrap().control.as_ref(), Some(&ctrl));

    let start = Instant::now();
    assert!(mux.wait_cycle(Some(Duration::from_millis(50))).unwrap().is_empty());
    assert!(start.elapsed() >= Duration::from_millis(40));
}
