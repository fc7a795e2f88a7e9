// Copyright 2024 hidclient Authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Event Sources
//!
//! Opening of event devices and FIFOs, decoding of `struct input_event`
//! records, and device identification through the evdev ioctls.

use std::ffi::CString;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::Path;

use devices::RawInputEvent;
use log::debug;
use vmm_sys_util::ioctl::{_IOC_READ, ioctl_with_mut_ptr, ioctl_with_mut_ref};
use vmm_sys_util::{ioctl_ioc_nr, ioctl_ior_nr};

use super::{InputError, Result};
use crate::config::MAX_EVENT_DEVICES;

/// Size of one `struct input_event` record
pub const EVENT_RECORD_LEN: usize = std::mem::size_of::<libc::input_event>();

// type, code and value are the trailing 8 bytes, after the timestamp
const TYPE_OFFSET: usize = EVENT_RECORD_LEN - 8;
const CODE_OFFSET: usize = EVENT_RECORD_LEN - 6;
const VALUE_OFFSET: usize = EVENT_RECORD_LEN - 4;

const EVDEV_PATH_PREFIX: &str = "/dev/input/event";
const DEVICE_NAME_LEN: usize = 256;

ioctl_ior_nr!(EVIOCGID, 0x45, 0x02, libc::input_id);
ioctl_ioc_nr!(EVIOCGNAME, _IOC_READ, 0x45, 0x06, DEVICE_NAME_LEN as u32);

/// Path of event device `index`
pub fn device_path(index: usize) -> String {
    format!("{EVDEV_PATH_PREFIX}{index}")
}

/// Decode one record, `None` if it is short
pub fn decode_record(record: &[u8]) -> Option<RawInputEvent> {
    let record = record.get(..EVENT_RECORD_LEN)?;
    let ev_type = u16::from_ne_bytes([record[TYPE_OFFSET], record[TYPE_OFFSET + 1]]);
    let code = u16::from_ne_bytes([record[CODE_OFFSET], record[CODE_OFFSET + 1]]);
    let value = i32::from_ne_bytes([
        record[VALUE_OFFSET],
        record[VALUE_OFFSET + 1],
        record[VALUE_OFFSET + 2],
        record[VALUE_OFFSET + 3],
    ]);
    Some(RawInputEvent::new(ev_type, code, value))
}

/// Encode `event` the way a FIFO writer has to, with a zero timestamp
pub fn encode_record(event: &RawInputEvent) -> [u8; EVENT_RECORD_LEN] {
    let mut record = [0u8; EVENT_RECORD_LEN];
    record[TYPE_OFFSET..CODE_OFFSET].copy_from_slice(&event.ev_type.to_ne_bytes());
    record[CODE_OFFSET..VALUE_OFFSET].copy_from_slice(&event.code.to_ne_bytes());
    record[VALUE_OFFSET..].copy_from_slice(&event.value.to_ne_bytes());
    record
}

fn device_id(fd: &OwnedFd) -> io::Result<libc::input_id> {
    let mut id = libc::input_id {
        bustype: 0,
        vendor: 0,
        product: 0,
        version: 0,
    };
    // SAFETY: EVIOCGID writes one `input_id` into memory we own exclusively.
    let ret = unsafe { ioctl_with_mut_ref(fd, EVIOCGID(), &mut id) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(id)
}

fn device_name(fd: &OwnedFd) -> io::Result<String> {
    let mut buf = [0u8; DEVICE_NAME_LEN];
    // SAFETY: the request encodes DEVICE_NAME_LEN, so the kernel writes at
    // most buf.len() bytes.
    let ret = unsafe { ioctl_with_mut_ptr(fd, EVIOCGNAME(), buf.as_mut_ptr()) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

/// Origin of an event source
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Device,
    Fifo,
}

/// One readable input origin
#[derive(Debug)]
pub struct EventSource {
    fd: OwnedFd,
    /// Our own write end of a FIFO; keeps the read end from hitting EOF
    /// whenever the last external writer closes.
    _writer: Option<OwnedFd>,
    kind: SourceKind,
    name: String,
    index: usize,
    detached: bool,
}

impl EventSource {
    /// Wrap an already open, non-blocking descriptor
    pub fn from_fd(fd: OwnedFd, kind: SourceKind, name: impl Into<String>, index: usize) -> Self {
        Self {
            fd,
            _writer: None,
            kind,
            name: name.into(),
            index,
            detached: false,
        }
    }

    /// Open `/dev/input/event{index}` read-only and non-blocking
    pub fn open_device(index: usize) -> io::Result<Self> {
        let path = device_path(index);
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)?;
        let fd = OwnedFd::from(file);
        let name = device_name(&fd).unwrap_or_else(|e| {
            debug!("EVIOCGNAME failed on {path}: {e}");
            String::new()
        });
        Ok(Self::from_fd(fd, SourceKind::Device, name, index))
    }

    /// Open the FIFO at `path`, creating it with mode 0600 when missing
    pub fn open_fifo(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        match fs::metadata(path) {
            Ok(meta) if !meta.file_type().is_fifo() => {
                return Err(InputError::NotAFifo(display));
            }
            Ok(_) => {}
            Err(_) => create_fifo(path).map_err(|source| InputError::Fifo {
                path: display.clone(),
                source,
            })?,
        }

        let fifo_err = |source| InputError::Fifo {
            path: display.clone(),
            source,
        };
        let reader = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(fifo_err)?;
        let writer = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(fifo_err)?;

        Ok(Self {
            _writer: Some(OwnedFd::from(writer)),
            ..Self::from_fd(OwnedFd::from(reader), SourceKind::Fifo, display, 0)
        })
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Device name, or the FIFO path
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `N` of `/dev/input/eventN`; 0 for a FIFO
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub(crate) fn detach(&mut self) {
        self.detached = true;
    }

    /// Read one record; `Ok(None)` when the read came back empty or short
    pub fn read_event(&self) -> io::Result<Option<RawInputEvent>> {
        let mut buf = [0u8; EVENT_RECORD_LEN];
        // SAFETY: buf is valid for buf.len() bytes of writes and the
        // descriptor stays open for the duration of the call.
        let n = unsafe { libc::read(self.fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(decode_record(&buf[..n as usize]))
    }
}

impl AsFd for EventSource {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

fn create_fifo(path: &Path) -> io::Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: c_path is a valid NUL-terminated string.
    let ret = unsafe { libc::mkfifo(c_path.as_ptr(), libc::S_IRUSR | libc::S_IWUSR) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Result of probing one event device for `--list`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceProbe {
    Readable {
        index: usize,
        vendor: u16,
        product: u16,
        version: u16,
        name: String,
    },
    PermissionDenied {
        index: usize,
    },
}

impl DeviceProbe {
    /// Device name, if it could be read
    pub fn name(&self) -> Option<&str> {
        match self {
            DeviceProbe::Readable { name, .. } => Some(name),
            DeviceProbe::PermissionDenied { .. } => None,
        }
    }
}

impl fmt::Display for DeviceProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceProbe::Readable {
                index,
                vendor,
                product,
                version,
                name,
            } => write!(
                f,
                "{index:2}\t[{vendor:04x}:{product:04x}.{version:04x}] '{name}'"
            ),
            DeviceProbe::PermissionDenied { index } => {
                write!(f, "{index:2}:\t[permission denied]")
            }
        }
    }
}

/// Walk `/dev/input/event0..` up to the first missing node
pub fn probe_devices() -> Vec<DeviceProbe> {
    let mut probes = Vec::new();
    for index in 0..MAX_EVENT_DEVICES {
        let file = match File::open(device_path(index)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => break,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                probes.push(DeviceProbe::PermissionDenied { index });
                continue;
            }
            Err(e) => {
                debug!("Skipping {}: {e}", device_path(index));
                continue;
            }
        };
        let fd = OwnedFd::from(file);
        let (Ok(id), Ok(name)) = (device_id(&fd), device_name(&fd)) else {
            continue;
        };
        probes.push(DeviceProbe::Readable {
            index,
            vendor: id.vendor,
            product: id.product,
            version: id.version,
            name,
        });
    }
    probes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    use devices::evdev::keys;

    fn scratch_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("hidclient-{tag}-{}", std::process::id()))
    }

    #[test]
    fn test_record_size() {
        assert_eq!(EVENT_RECORD_LEN, 16 + 8);
    }

    #[test]
    fn test_record_layout() {
        let record = encode_record(&RawInputEvent::key(keys::KEY_A, 1));
        assert!(record[..16].iter().all(|&b| b == 0));
        assert_eq!(record[16..18], 1u16.to_ne_bytes());
        assert_eq!(record[18..20], keys::KEY_A.to_ne_bytes());
        assert_eq!(record[20..], 1i32.to_ne_bytes());
    }

    #[test]
    fn test_decode_record() {
        let buf = encode_record(&RawInputEvent::key(keys::KEY_A, 1));
        assert_eq!(
            decode_record(&buf),
            Some(RawInputEvent::key(keys::KEY_A, 1))
        );

        let buf = encode_record(&RawInputEvent::rel(0, -5));
        assert_eq!(decode_record(&buf).map(|e| e.value), Some(-5));
    }

    #[test]
    fn test_decode_short_record() {
        let buf = encode_record(&RawInputEvent::key(keys::KEY_A, 1));
        assert_eq!(decode_record(&buf[..EVENT_RECORD_LEN - 1]), None);
        assert_eq!(decode_record(&[]), None);
    }

    #[test]
    fn test_device_path() {
        assert_eq!(device_path(7), "/dev/input/event7");
    }

    #[test]
    fn test_read_event_from_socket() {
        let (mut tx, rx) = UnixStream::pair().unwrap();
        rx.set_nonblocking(true).unwrap();
        let source = EventSource::from_fd(OwnedFd::from(rx), SourceKind::Device, "test", 3);

        tx.write_all(&encode_record(&RawInputEvent::key(keys::KEY_B, 0))).unwrap();
        assert_eq!(
            source.read_event().unwrap(),
            Some(RawInputEvent::key(keys::KEY_B, 0))
        );

        let err = source.read_event().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
        assert_eq!(source.index(), 3);
        assert_eq!(source.name(), "test");
    }

    #[test]
    fn test_open_fifo_creates_pipe() {
        let path = scratch_path("fifo");
        let _ = fs::remove_file(&path);

        let source = EventSource::open_fifo(&path).unwrap();
        assert_eq!(source.kind(), SourceKind::Fifo);
        assert!(fs::metadata(&path).unwrap().file_type().is_fifo());

        let mut writer = OpenOptions::new().write(true).open(&path).unwrap();
        writer.write_all(&encode_record(&RawInputEvent::key(keys::KEY_Z, 1))).unwrap();
        drop(writer);

        assert_eq!(
            source.read_event().unwrap(),
            Some(RawInputEvent::key(keys::KEY_Z, 1))
        );
        // Our own write end keeps EOF away after the writer left
        assert_eq!(
            source.read_event().unwrap_err().kind(),
            io::ErrorKind::WouldBlock
        );

        drop(source);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_open_fifo_rejects_regular_file() {
        let path = scratch_path("plain");
        fs::write(&path, b"not a fifo").unwrap();

        let err = EventSource::open_fifo(&path).unwrap_err();
        assert!(matches!(err, InputError::NotAFifo(_)));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_probe_display() {
        let probe = DeviceProbe::Readable {
            index: 3,
            vendor: 0x046d,
            product: 0xc52b,
            version: 0x0111,
            name: "Logitech USB Receiver".to_string(),
        };
        assert_eq!(
            probe.to_string(),
            " 3\t[046d:c52b.0111] 'Logitech USB Receiver'"
        );
        assert_eq!(
            DeviceProbe::PermissionDenied { index: 12 }.to_string(),
            "12:\t[permission denied]"
        );
    }
}
