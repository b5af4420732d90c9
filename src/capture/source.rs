use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::CaptureError;
use super::decode::{LinkKind, tcp_payload};

/// Bytes captured per packet.
pub const SNAPLEN: i32 = 65536;

/// Read timeout; the reader checks for cancellation at least this often.
pub const READ_TIMEOUT_MS: i32 = 500;

/// A blocking stream of link-layer frames.
pub trait PacketSource: Send {
    fn link(&self) -> LinkKind;

    /// Next frame, or `Ok(None)` when the read timed out without traffic.
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>, CaptureError>;
}

/// Name of the loopback interface on this platform.
pub fn loopback_device() -> Result<&'static str, CaptureError> {
    if cfg!(target_os = "linux") {
        Ok("lo")
    } else if cfg!(any(
        target_os = "macos",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd"
    )) {
        Ok("lo0")
    } else {
        Err(CaptureError::Unsupported(format!(
            "no loopback capture on {}",
            std::env::consts::OS
        )))
    }
}

/// Open the loopback interface filtered to TCP traffic on `port`.
#[cfg(feature = "live-capture")]
pub fn open_loopback(port: u16) -> Result<Box<dyn PacketSource>, CaptureError> {
    let device = loopback_device()?;
    Ok(Box::new(pcap_source::PcapSource::open(device, port)?))
}

#[cfg(not(feature = "live-capture"))]
pub fn open_loopback(_port: u16) -> Result<Box<dyn PacketSource>, CaptureError> {
    loopback_device()?;
    Err(CaptureError::Unsupported(
        "built without the live-capture feature".to_string(),
    ))
}

#[cfg(feature = "live-capture")]
mod pcap_source {
    use super::*;

    pub struct PcapSource {
        capture: pcap::Capture<pcap::Active>,
        link: LinkKind,
    }

    impl PcapSource {
        pub fn open(device: &str, port: u16) -> Result<Self, CaptureError> {
            let open_err = |e: pcap::Error| CaptureError::Open {
                device: device.to_string(),
                message: e.to_string(),
            };

            let mut capture = pcap::Capture::from_device(device)
                .map_err(open_err)?
                .snaplen(SNAPLEN)
                .promisc(true)
                .timeout(READ_TIMEOUT_MS)
                .open()
                .map_err(open_err)?;

            let filter = format!("tcp port {port}");
            capture
                .filter(&filter, true)
                .map_err(|e| CaptureError::Filter {
                    filter: filter.clone(),
                    message: e.to_string(),
                })?;

            let link = LinkKind::from_dlt(capture.get_datalink().0);
            log::debug!("Opened {device} with filter {filter:?}, link type {link:?}");

            Ok(Self { capture, link })
        }
    }

    impl PacketSource for PcapSource {
        fn link(&self) -> LinkKind {
            self.link
        }

        fn next_frame(&mut self) -> Result<Option<Vec<u8>>, CaptureError> {
            match self.capture.next_packet() {
                Ok(packet) => Ok(Some(packet.data.to_vec())),
                Err(pcap::Error::TimeoutExpired) => Ok(None),
                Err(pcap::Error::NoMorePackets) => Err(CaptureError::Closed),
                Err(e) => Err(CaptureError::Read(e.to_string())),
            }
        }
    }
}

/// Pump TCP payloads from `source` into `tx` on a blocking thread.
///
/// Ends when cancelled, when the receiver is gone, or when the source closes.
/// Returns the number of payloads forwarded.
pub fn spawn_reader(
    mut source: Box<dyn PacketSource>,
    tx: mpsc::Sender<Vec<u8>>,
    shutdown: CancellationToken,
) -> JoinHandle<Result<u64, CaptureError>> {
    tokio::task::spawn_blocking(move || {
        let link = source.link();
        if let LinkKind::Unsupported(dlt) = link {
            return Err(CaptureError::Unsupported(format!("link type {dlt}")));
        }

        let mut forwarded = 0u64;
        while !shutdown.is_cancelled() {
            match source.next_frame() {
                Ok(Some(frame)) => {
                    let Some(payload) = tcp_payload(link, &frame) else {
                        continue;
                    };
                    if tx.blocking_send(payload.to_vec()).is_err() {
                        break;
                    }
                    forwarded += 1;
                }
                Ok(None) => continue,
                Err(CaptureError::Closed) => break,
                Err(e) => return Err(e),
            }
        }

        log::debug!("Capture reader stopped after {forwarded} payloads");
        Ok(forwarded)
    })
}
