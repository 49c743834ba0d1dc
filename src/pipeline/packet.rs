//! Binary payloads carried between pads.
//!
//! Pads move opaque byte slices; these are the formats the built-in nodes
//! agree on. All integers and floats are little-endian. Strings are a `u16`
//! byte length followed by UTF-8.

use crate::perception::{
    BoundingBox, Detection, DetectionResult, ImageView, PerceptionError, PerceptionResult,
    PixelFormat, Track, TrackHistoryPoint, TrackStatus, TrackingResult,
};
use crate::pipeline::nodes::EnvironmentState;
use crate::pipeline::params::GeoPoint;

/// `"DRES"` read as a little-endian `u32`.
pub const DETECTION_MAGIC: u32 = 0x5345_5244;
/// `"TRES"` read as a little-endian `u32`.
pub const TRACKING_MAGIC: u32 = 0x5345_5254;
pub const PACKET_VERSION: u8 = 1;

/// Width of the NUL-padded pixel format field in a camera frame header.
const FORMAT_FIELD_LEN: usize = 16;

/// Encode/decode for a pad payload.
pub trait WirePacket: Sized {
    fn encode(&self) -> Vec<u8>;
    fn decode(bytes: &[u8]) -> PerceptionResult<Self>;
}

// ── Byte helpers ──

#[derive(Default)]
struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    fn with_capacity(n: usize) -> Self {
        Self {
            buf: Vec::with_capacity(n),
        }
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Truncates at `u16::MAX` bytes, on a char boundary.
    fn str(&mut self, s: &str) {
        let mut end = s.len().min(u16::MAX as usize);
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        self.buf.extend_from_slice(&(end as u16).to_le_bytes());
        self.buf.extend_from_slice(&s.as_bytes()[..end]);
    }

    fn bbox(&mut self, b: &BoundingBox) {
        self.f32(b.x);
        self.f32(b.y);
        self.f32(b.width);
        self.f32(b.height);
    }

    fn header(&mut self, magic: u32, frame_index: u32, timestamp_ns: u64, frame_id: &str) {
        self.u32(magic);
        self.u8(PACKET_VERSION);
        self.buf.extend_from_slice(&[0; 3]);
        self.u32(frame_index);
        self.u64(timestamp_ns);
        self.str(frame_id);
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    what: &'static str,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8], what: &'static str) -> Self {
        Self { data, pos: 0, what }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> PerceptionResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(PerceptionError::Packet(format!(
                "{}: need {} bytes at offset {}, have {}",
                self.what,
                n,
                self.pos,
                self.remaining()
            )));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> PerceptionResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> PerceptionResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> PerceptionResult<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> PerceptionResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn i32(&mut self) -> PerceptionResult<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> PerceptionResult<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn f32(&mut self) -> PerceptionResult<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    fn f64(&mut self) -> PerceptionResult<f64> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    fn str(&mut self) -> PerceptionResult<String> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| PerceptionError::Packet(format!("{}: string is not UTF-8", self.what)))
    }

    fn bbox(&mut self) -> PerceptionResult<BoundingBox> {
        Ok(BoundingBox::new(self.f32()?, self.f32()?, self.f32()?, self.f32()?))
    }

    /// Element count, bounded by what the remaining bytes could hold.
    fn count(&mut self, min_item_size: usize) -> PerceptionResult<usize> {
        let count = self.u32()? as usize;
        if count.saturating_mul(min_item_size) > self.remaining() {
            return Err(PerceptionError::Packet(format!(
                "{}: {} items cannot fit in {} bytes",
                self.what,
                count,
                self.remaining()
            )));
        }
        Ok(count)
    }

    fn header(&mut self, magic: u32) -> PerceptionResult<(u32, u64, String)> {
        let found = self.u32()?;
        if found != magic {
            return Err(PerceptionError::Packet(format!(
                "{}: bad magic {:#010x}",
                self.what, found
            )));
        }
        let version = self.u8()?;
        if version != PACKET_VERSION {
            return Err(PerceptionError::Packet(format!(
                "{}: unsupported version {}",
                self.what, version
            )));
        }
        self.take(3)?;
        Ok((self.u32()?, self.u64()?, self.str()?))
    }
}

// ── Camera frames ──

/// An owned interleaved image plus capture metadata.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: PixelFormat,
    pub frame_index: u32,
    pub timestamp_ns: u64,
    pub pixels: Vec<u8>,
}

impl CameraFrame {
    pub fn view(&self) -> ImageView<'_> {
        ImageView {
            data: &self.pixels,
            width: self.width,
            height: self.height,
            stride: self.stride,
            format: self.format,
        }
    }
}

impl WirePacket for CameraFrame {
    fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(40 + self.pixels.len());
        w.u32(self.width);
        w.u32(self.height);
        w.u32(self.stride);
        let mut format = [0u8; FORMAT_FIELD_LEN];
        let name = self.format.as_str().as_bytes();
        format[..name.len()].copy_from_slice(name);
        w.buf.extend_from_slice(&format);
        w.u32(self.frame_index);
        w.u64(self.timestamp_ns);
        w.buf.extend_from_slice(&self.pixels);
        w.finish()
    }

    fn decode(bytes: &[u8]) -> PerceptionResult<Self> {
        let mut r = ByteReader::new(bytes, "camera frame");
        let width = r.u32()?;
        let height = r.u32()?;
        let stride = r.u32()?;
        let raw_format: [u8; FORMAT_FIELD_LEN] = r.array()?;
        let end = raw_format.iter().position(|&b| b == 0).unwrap_or(FORMAT_FIELD_LEN);
        let name = std::str::from_utf8(&raw_format[..end]).unwrap_or("");
        let format = PixelFormat::parse(name)
            .ok_or_else(|| PerceptionError::Packet(format!("camera frame: unknown format '{}'", name)))?;
        let frame_index = r.u32()?;
        let timestamp_ns = r.u64()?;
        let pixels = r.take(r.remaining())?.to_vec();

        let frame = Self {
            width,
            height,
            stride,
            format,
            frame_index,
            timestamp_ns,
            pixels,
        };
        if !frame.view().is_valid() {
            return Err(PerceptionError::Packet(format!(
                "camera frame: {}x{} stride {} does not match {} pixel bytes",
                width,
                height,
                stride,
                frame.pixels.len()
            )));
        }
        Ok(frame)
    }
}

// ── Detections and tracks ──

impl WirePacket for DetectionResult {
    fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(32 + self.detections.len() * 34);
        w.header(DETECTION_MAGIC, self.frame_index, self.timestamp_ns, &self.frame_id);
        w.u32(self.detections.len() as u32);
        for d in &self.detections {
            w.bbox(&d.bbox);
            w.f32(d.score);
            w.i32(d.class_id);
            w.u32(d.track_id.unwrap_or(0));
            w.str(d.class_name.as_deref().unwrap_or(""));
        }
        w.finish()
    }

    fn decode(bytes: &[u8]) -> PerceptionResult<Self> {
        let mut r = ByteReader::new(bytes, "detection packet");
        let (frame_index, timestamp_ns, frame_id) = r.header(DETECTION_MAGIC)?;
        let count = r.count(30)?;

        let mut result = DetectionResult::new(frame_id, frame_index, timestamp_ns);
        result.detections.reserve(count);
        for _ in 0..count {
            let bbox = r.bbox()?;
            let score = r.f32()?;
            let class_id = r.i32()?;
            let track_id = r.u32()?;
            let class_name = r.str()?;
            result.detections.push(Detection {
                bbox,
                score,
                class_id,
                class_name: (!class_name.is_empty()).then_some(class_name),
                track_id: (track_id != 0).then_some(track_id),
            });
        }
        Ok(result)
    }
}

impl WirePacket for TrackingResult {
    fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::default();
        w.header(TRACKING_MAGIC, self.frame_index, self.timestamp_ns, &self.frame_id);
        w.u32(self.tracks.len() as u32);
        for t in &self.tracks {
            w.u32(t.track_id);
            w.i32(t.class_id);
            w.u8(match t.status {
                TrackStatus::Active => 0,
                TrackStatus::Lost => 1,
            });
            w.bbox(&t.bbox);
            w.str(t.class_name.as_deref().unwrap_or(""));
            w.u32(t.trajectory.len() as u32);
            for p in &t.trajectory {
                w.u64(p.timestamp_ns);
                w.bbox(&p.bbox);
            }
        }
        w.finish()
    }

    fn decode(bytes: &[u8]) -> PerceptionResult<Self> {
        let mut r = ByteReader::new(bytes, "tracking packet");
        let (frame_index, timestamp_ns, frame_id) = r.header(TRACKING_MAGIC)?;
        let count = r.count(31)?;

        let mut tracks = Vec::with_capacity(count);
        for _ in 0..count {
            let track_id = r.u32()?;
            let class_id = r.i32()?;
            let status = match r.u8()? {
                0 => TrackStatus::Active,
                1 => TrackStatus::Lost,
                other => {
                    return Err(PerceptionError::Packet(format!(
                        "tracking packet: bad status {}",
                        other
                    )))
                }
            };
            let bbox = r.bbox()?;
            let class_name = r.str()?;
            let points = r.count(24)?;
            let mut trajectory = Vec::with_capacity(points);
            for _ in 0..points {
                trajectory.push(TrackHistoryPoint {
                    timestamp_ns: r.u64()?,
                    bbox: r.bbox()?,
                });
            }
            tracks.push(Track {
                track_id,
                class_id,
                class_name: (!class_name.is_empty()).then_some(class_name),
                bbox,
                status,
                trajectory,
            });
        }

        Ok(TrackingResult {
            frame_id,
            frame_index,
            timestamp_ns,
            tracks,
        })
    }
}

// ── Small status payloads ──

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentStatus {
    pub state: EnvironmentState,
    pub confidence: f32,
}

impl WirePacket for EnvironmentStatus {
    fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(8);
        w.i32(self.state.code());
        w.f32(self.confidence);
        w.finish()
    }

    fn decode(bytes: &[u8]) -> PerceptionResult<Self> {
        let mut r = ByteReader::new(bytes, "environment status");
        let code = r.i32()?;
        let state = EnvironmentState::from_code(code).ok_or_else(|| {
            PerceptionError::Packet(format!("environment status: unknown state {}", code))
        })?;
        Ok(Self {
            state,
            confidence: r.f32()?,
        })
    }
}

/// Position plus orientation quaternion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub qx: f64,
    pub qy: f64,
    pub qz: f64,
    pub qw: f64,
    pub timestamp_ns: u64,
}

impl Pose3D {
    pub fn identity(timestamp_ns: u64) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            qx: 0.0,
            qy: 0.0,
            qz: 0.0,
            qw: 1.0,
            timestamp_ns,
        }
    }
}

impl Default for Pose3D {
    fn default() -> Self {
        Self::identity(0)
    }
}

impl WirePacket for Pose3D {
    fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(64);
        for v in [self.x, self.y, self.z, self.qx, self.qy, self.qz, self.qw] {
            w.f64(v);
        }
        w.u64(self.timestamp_ns);
        w.finish()
    }

    fn decode(bytes: &[u8]) -> PerceptionResult<Self> {
        let mut r = ByteReader::new(bytes, "pose");
        Ok(Self {
            x: r.f64()?,
            y: r.f64()?,
            z: r.f64()?,
            qx: r.f64()?,
            qy: r.f64()?,
            qz: r.f64()?,
            qw: r.f64()?,
            timestamp_ns: r.u64()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClusterState {
    pub self_id: String,
    pub role: String,
    pub members: Vec<String>,
    pub timestamp_ns: u64,
}

impl WirePacket for ClusterState {
    fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::default();
        w.str(&self.self_id);
        w.str(&self.role);
        w.u32(self.members.len() as u32);
        for m in &self.members {
            w.str(m);
        }
        w.u64(self.timestamp_ns);
        w.finish()
    }

    fn decode(bytes: &[u8]) -> PerceptionResult<Self> {
        let mut r = ByteReader::new(bytes, "cluster state");
        let self_id = r.str()?;
        let role = r.str()?;
        let count = r.count(2)?;
        let members = (0..count).map(|_| r.str()).collect::<PerceptionResult<_>>()?;
        Ok(Self {
            self_id,
            role,
            members,
            timestamp_ns: r.u64()?,
        })
    }
}

/// Ordered waypoints from a path planner.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WaypointList(pub Vec<GeoPoint>);

impl WirePacket for WaypointList {
    fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(4 + self.0.len() * 24);
        w.u32(self.0.len() as u32);
        for p in &self.0 {
            w.f64(p.lat);
            w.f64(p.lon);
            w.f64(p.alt);
        }
        w.finish()
    }

    fn decode(bytes: &[u8]) -> PerceptionResult<Self> {
        let mut r = ByteReader::new(bytes, "waypoint list");
        let count = r.count(24)?;
        let mut points = Vec::with_capacity(count);
        for _ in 0..count {
            points.push(GeoPoint::new(r.f64()?, r.f64()?, r.f64()?));
        }
        Ok(Self(points))
    }
}

/// Name the payload by its leading bytes, for logging sinks.
pub fn describe(bytes: &[u8]) -> String {
    if bytes.len() >= 4 {
        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic == DETECTION_MAGIC {
            if let Ok(d) = DetectionResult::decode(bytes) {
                return format!(
                    "detections frame={} count={}",
                    d.frame_index,
                    d.detections.len()
                );
            }
        } else if magic == TRACKING_MAGIC {
            if let Ok(t) = TrackingResult::decode(bytes) {
                let lost = t.tracks.iter().filter(|t| t.status == TrackStatus::Lost).count();
                return format!(
                    "tracks frame={} count={} lost={}",
                    t.frame_index,
                    t.tracks.len(),
                    lost
                );
            }
        }
    }
    format!("{} bytes", bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_detections() -> DetectionResult {
        let mut d = DetectionResult::new("cam0", 7, 123_456);
        d.detections.push(Detection::new(BoundingBox::new(1.0, 2.0, 3.0, 4.0), 0.9, 2));
        let mut named = Detection::new(BoundingBox::new(5.0, 6.0, 7.0, 8.0), 0.5, 0);
        named.class_name = Some("person".into());
        named.track_id = Some(12);
        d.detections.push(named);
        d
    }

    #[test]
    fn test_detection_packet_layout() {
        let bytes = sample_detections().encode();
        assert_eq!(&bytes[..4], b"DRES");
        assert_eq!(bytes[4], PACKET_VERSION);
        assert_eq!(u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]), 7);
    }

    #[test]
    fn test_detection_packet_preserves_optional_fields() {
        let decoded = DetectionResult::decode(&sample_detections().encode()).unwrap();
        assert_eq!(decoded, sample_detections());
        assert_eq!(decoded.detections[0].track_id, None);
    }

    #[test]
    fn test_wrong_magic_and_truncation() {
        let bytes = sample_detections().encode();
        assert!(TrackingResult::decode(&bytes).is_err());
        assert!(matches!(
            DetectionResult::decode(&bytes[..bytes.len() - 1]),
            Err(PerceptionError::Packet(_))
        ));
    }

    #[test]
    fn test_absurd_count_rejected_without_allocating() {
        let mut bytes = DetectionResult::new("", 0, 0).encode();
        let n = bytes.len();
        bytes[n - 4..].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(DetectionResult::decode(&bytes).is_err());
    }

    #[test]
    fn test_tracking_packet_with_trajectory() {
        let mut t = TrackingResult {
            frame_id: "cam0".into(),
            frame_index: 3,
            timestamp_ns: 99,
            tracks: Vec::new(),
        };
        t.tracks.push(Track {
            track_id: 4,
            class_id: 1,
            class_name: None,
            bbox: BoundingBox::new(1.0, 1.0, 2.0, 2.0),
            status: TrackStatus::Lost,
            trajectory: vec![TrackHistoryPoint {
                timestamp_ns: 98,
                bbox: BoundingBox::new(0.0, 1.0, 2.0, 2.0),
            }],
        });
        let bytes = t.encode();
        assert_eq!(&bytes[..4], b"TRES");
        assert_eq!(TrackingResult::decode(&bytes).unwrap(), t);
        assert_eq!(describe(&bytes), "tracks frame=3 count=1 lost=1");
    }

    #[test]
    fn test_camera_frame_header_and_validation() {
        let frame = CameraFrame {
            width: 2,
            height: 2,
            stride: 6,
            format: PixelFormat::Bgr8,
            frame_index: 1,
            timestamp_ns: 5,
            pixels: vec![9; 12],
        };
        let bytes = frame.encode();
        assert_eq!(bytes.len(), 40 + 12);
        assert_eq!(&bytes[12..16], b"BGR8");
        assert_eq!(CameraFrame::decode(&bytes).unwrap(), frame);
        assert!(CameraFrame::decode(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_small_payloads() {
        let env = EnvironmentStatus {
            state: EnvironmentState::LowLight,
            confidence: 0.75,
        };
        assert_eq!(env.encode().len(), 8);
        assert_eq!(EnvironmentStatus::decode(&env.encode()).unwrap(), env);

        let pose = Pose3D::identity(42);
        assert_eq!(pose.encode().len(), 64);
        assert_eq!(Pose3D::decode(&pose.encode()).unwrap().qw, 1.0);

        let cluster = ClusterState {
            self_id: "uav1".into(),
            role: "leader".into(),
            members: vec!["uav2".into(), "uav3".into()],
            timestamp_ns: 4,
        };
        assert_eq!(ClusterState::decode(&cluster.encode()).unwrap(), cluster);

        let wps = WaypointList(vec![GeoPoint::new(1.0, 2.0, 3.0)]);
        assert_eq!(wps.encode().len(), 28);
        assert_eq!(WaypointList::decode(&wps.encode()).unwrap(), wps);
    }

    #[test]
    fn test_describe_fallback() {
        assert_eq!(describe(&[1, 2, 3]), "3 bytes");
    }
}
