//! Discovery of a fake sysfs tree through ZioContext.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zio::buffer::BufferKind;
use zio::config::{PathsConfig, ZioConfig};
use zio::trigger::TriggerKind;
use zio::{ControlRecord, Direction, Samples, ZioContext, ZioError};

fn write(path: &Path, contents: impl AsRef<[u8]>) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn object(dir: &Path, devtype: &str, attrs: &[(&str, &str)]) {
    fs::create_dir_all(dir).unwrap();
    write(&dir.join("devtype"), format!("{devtype}\n"));
    write(&dir.join("uevent"), "");
    for (name, value) in attrs {
        write(&dir.join(name), format!("{value}\n"));
    }
}

fn channel(cset: &Path, index: u32, devname: &str, cdev: bool) {
    let name = format!("chan{index}");
    let dir = cset.join(&name);
    object(
        &dir,
        "zio_chan_type",
        &[("name", name.as_str()), ("devname", devname), ("enable", "1")],
    );
    write(&dir.join("current-control"), ControlRecord::default().encode());
    object(&dir.join("buffer"), "buffer", &[("max-buffer-len", "16")]);
    write(&dir.join("buffer/flush"), "");
    if cdev {
        fs::create_dir(dir.join("zio-cdev")).unwrap();
    }
}

/// Bus with one `zzero` device: cset0 is input with two channels (only
/// chan0 has a cdev), cset1 is output with one channel.
struct FakeBus {
    _root: TempDir,
    config: ZioConfig,
}

impl FakeBus {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        let bus = root.path().join("sys/bus/zio");
        let dev_root = root.path().join("dev/zio");
        fs::create_dir_all(&dev_root).unwrap();
        write(&bus.join("available_buffers"), "kmalloc\nvmalloc\n");
        write(&bus.join("available_triggers"), "user\ntimer\n");

        let device = bus.join("devices/zzero-0000");
        object(
            &device,
            "zio_device",
            &[("name", "zzero"), ("devname", "zzero-0000"), ("enable", "1")],
        );

        let cset0 = device.join("cset0");
        object(
            &cset0,
            "zio_cset_type",
            &[
                ("name", "cset0"),
                ("devname", "zzero-0000-0"),
                ("direction", "input"),
                ("current_buffer", "kmalloc"),
                ("current_trigger", "timer"),
                ("enable", "1"),
            ],
        );
        object(
            &cset0.join("trigger"),
            "zio_ti_type",
            &[("ms-period", "100"), ("post-samples", "16"), ("enable", "1")],
        );
        channel(&cset0, 0, "zzero-0000-0-0", true);
        channel(&cset0, 1, "zzero-0000-0-1", false);

        let cset1 = device.join("cset1");
        object(
            &cset1,
            "zio_cset_type",
            &[
                ("name", "cset1"),
                ("devname", "zzero-0000-1"),
                ("direction", "output"),
                ("current_buffer", "vmalloc"),
                ("current_trigger", "user"),
            ],
        );
        channel(&cset1, 0, "zzero-0000-1-0", true);

        // hardware parent, not a ZIO device
        fs::create_dir_all(bus.join("devices/hw-zzero-0000")).unwrap();

        let config = ZioConfig {
            paths: PathsConfig {
                sysfs_bus: bus,
                dev_root,
            },
            ..Default::default()
        };
        Self {
            _root: root,
            config,
        }
    }

    fn dev_file(&self, name: &str) -> PathBuf {
        self.config.paths.dev_root.join(name)
    }
}

#[test]
fn test_discovers_tree() {
    let bus = FakeBus::new();
    let ctx = ZioContext::new(bus.config.clone()).unwrap();

    assert!(ctx.is_loaded());
    assert_eq!(ctx.available_buffers(), ["kmalloc", "vmalloc"]);
    assert_eq!(ctx.available_triggers(), ["user", "timer"]);
    assert_eq!(ctx.devices().len(), 1);

    let dev = ctx.device("zzero", 0).unwrap();
    assert_eq!(dev.devname(), "zzero-0000");
    assert_eq!(dev.csets().len(), 2);
    assert_eq!(ctx.channels().count(), 3);

    let cset0 = dev.cset(0).unwrap();
    assert_eq!(cset0.direction(), Direction::Input);
    assert_eq!(cset0.trigger().unwrap().kind(), TriggerKind::Timer);
    assert_eq!(cset0.trigger().unwrap().period_ms().unwrap(), 100);
    assert_eq!(cset0.current_buffer().unwrap(), "kmalloc");

    let cset1 = dev.cset(1).unwrap();
    assert_eq!(cset1.direction(), Direction::Output);
    assert!(cset1.trigger().is_none());

    let chan = cset0.channels()[0].lock();
    assert_eq!(chan.oid(), Some(0));
    assert_eq!(chan.buffer().unwrap().kind(), BufferKind::Kmalloc);
    assert!(chan.interface().is_some());
    drop(chan);
    assert!(cset0.channels()[1].lock().interface().is_none());

    let out = cset1.channels()[0].lock();
    assert_eq!(out.buffer().unwrap().kind(), BufferKind::Vmalloc);
    assert_eq!(out.direction(), Direction::Output);
}

#[test]
fn test_not_loaded() {
    let root = TempDir::new().unwrap();
    let config = ZioConfig {
        paths: PathsConfig {
            sysfs_bus: root.path().join("missing"),
            dev_root: root.path().to_path_buf(),
        },
        ..Default::default()
    };
    assert!(matches!(
        ZioContext::new(config),
        Err(ZioError::NotLoaded { .. })
    ));
    assert!(!zio::context::is_loaded(root.path()));
}

#[test]
fn test_channel_read_block_through_tree() {
    let bus = FakeBus::new();
    let ctrl = ControlRecord {
        sample_size: 1,
        sample_count: 3,
        ..Default::default()
    };
    write(&bus.dev_file("zzero-0000-0-0-ctrl"), ctrl.encode());
    write(&bus.dev_file("zzero-0000-0-0-data"), [5u8, 6, 7]);

    let ctx = ZioContext::new(bus.config.clone()).unwrap();
    let channel = ctx.channel("zzero-0000-0-0").unwrap();
    let block = channel.lock().read_block(true, true, true).unwrap();
    assert_eq!(block.control, Some(ctrl));
    assert_eq!(block.samples(), Some(&Samples::U8(vec![5, 6, 7])));

    assert!(ctx.channel("zzero-0000-9-9").is_none());
}

#[test]
fn test_open_channels_by_direction() {
    let bus = FakeBus::new();
    for name in ["zzero-0000-0-0", "zzero-0000-1-0"] {
        write(&bus.dev_file(&format!("{name}-ctrl")), b"");
        write(&bus.dev_file(&format!("{name}-data")), b"");
    }
    let ctx = ZioContext::new(bus.config.clone()).unwrap();

    let inputs = ctx.open_channels(Some(Direction::Input)).unwrap();
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].lock().devname(), "zzero-0000-0-0");
    assert!(inputs[0].lock().interface().unwrap().control_fd().is_some());

    let all = ctx.open_channels(None).unwrap();
    assert_eq!(all.len(), 2);
}

#[test]
fn test_enable_and_current_control() {
    let bus = FakeBus::new();
    let ctx = ZioContext::new(bus.config.clone()).unwrap();
    let channel = ctx.channel("zzero-0000-0-1").unwrap();
    let chan = channel.lock();

    chan.disable().unwrap();
    assert!(!chan.is_enabled().unwrap());

    let mut ctrl = ControlRecord {
        sample_count: 8,
        ..Default::default()
    };
    ctrl.trigger_attributes.set_standard(1, 3);
    ctrl.trigger_attributes.set_standard(2, 5);
    chan.set_current_control(&ctrl).unwrap();
    assert_eq!(chan.current_control().unwrap(), ctrl);

    chan.buffer().unwrap().flush().unwrap();
}

#[test]
fn test_refresh_picks_up_new_device() {
    let bus = FakeBus::new();
    let mut ctx = ZioContext::new(bus.config.clone()).unwrap();
    assert_eq!(ctx.devices().len(), 1);

    let second = bus.config.paths.devices_dir().join("zzero-0001");
    object(
        &second,
        "zio_device",
        &[("name", "zzero"), ("devname", "zzero-0001")],
    );
    ctx.refresh().unwrap();
    assert_eq!(ctx.devices().len(), 2);
    assert!(ctx.device("zzero", 1).is_some());
    assert_eq!(ctx.device("zzero", 1).unwrap().csets().len(), 0);
}

#[test]
fn test_unknown_cset_direction_defaults_to_input() {
    let bus = FakeBus::new();
    let cset2 = bus.config.paths.devices_dir().join("zzero-0000/cset2");
    object(
        &cset2,
        "zio_cset_type",
        &[("name", "cset2"), ("devname", "zzero-0000-2"), ("direction", "sideways")],
    );
    channel(&cset2, 0, "zzero-0000-2-0", false);

    let ctx = ZioContext::new(bus.config.clone()).unwrap();
    let dev = ctx.device("zzero", 0).unwrap();
    assert_eq!(dev.csets().len(), 3);
    assert_eq!(dev.cset(2).unwrap().direction(), Direction::Input);
    assert_eq!(ctx.channels().count(), 4);
}
