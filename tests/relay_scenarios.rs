use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use rtk_relay::basic::ntrip::{NtripOpt, NtripSession, PositionProvider, SessionState};
use rtk_relay::basic::pos::pos2ecef;
use rtk_relay::basic::var::GeoPos;
use rtk_relay::relay::{ArbiterOpt, Arbitrator, BaseStatus, ForwardMode, Uplink};

#[derive(Default)]
struct RecordingUplink {
    chunks: Mutex<Vec<Vec<u8>>>,
}

impl RecordingUplink {
    fn bytes(&self) -> Vec<u8> {
        self.chunks.lock().unwrap().concat()
    }
}

impl Uplink for RecordingUplink {
    fn send(&self, data: &[u8]) -> rtk_relay::Result<()> {
        self.chunks.lock().unwrap().push(data.to_vec());
        Ok(())
    }
}

fn frame(payload: &[u8]) -> Vec<u8> {
    let len = payload.len();
    let mut out = vec![0xD3, (len >> 8) as u8 & 0x03, len as u8];
    out.extend_from_slice(payload);
    out.extend_from_slice(&[0x11, 0x22, 0x33]);
    out
}

/// Payload starting with message number `msg_no`, padded to `len` bytes.
fn message(msg_no: u16, len: usize) -> Vec<u8> {
    let mut p = vec![0u8; len.max(2)];
    p[0] = (msg_no >> 4) as u8;
    p[1] = ((msg_no & 0x0F) << 4) as u8;
    p
}

fn put_bits(buf: &mut [u8], pos: usize, len: usize, value: u64) {
    for k in 0..len {
        let i = pos + k;
        if (value >> (len - 1 - k)) & 1 == 1 {
            buf[i / 8] |= 0x80 >> (i % 8);
        }
    }
}

fn station_message(station_id: u16, pos: &GeoPos) -> Vec<u8> {
    let ecef = pos2ecef(pos);
    let mut p = vec![0u8; 19];
    put_bits(&mut p, 0, 12, 1005);
    put_bits(&mut p, 12, 12, station_id as u64);
    let mask = (1u64 << 38) - 1;
    for (i, start) in [34usize, 74, 114].into_iter().enumerate() {
        let v = (ecef[i] * 10000.0).round() as i64;
        put_bits(&mut p, start, 38, v as u64 & mask);
    }
    p
}

fn arbiter(mode: ForwardMode) -> (Arbitrator, Arc<RecordingUplink>) {
    let uplink = Arc::new(RecordingUplink::default());
    let opt = ArbiterOpt {
        mode,
        timeout: Duration::from_secs(10),
        use_station_pos: true,
        static_pos: GeoPos::new(30.0, 120.0, 10.0),
    };
    (Arbitrator::new(opt, uplink.clone()), uplink)
}

#[test]
fn normal_mode_relays_stream_unchanged() {
    let (arb, uplink) = arbiter(ForwardMode::Normal);
    let t0 = Instant::now();
    let stream: Vec<u8> = [
        frame(&message(1074, 40)),
        frame(&message(1084, 30)),
        frame(&message(1005, 19)),
    ]
    .concat();

    // local station chatter never suppresses normal mode
    arb.on_local_at(&frame(&message(1077, 12)), t0);
    for (i, chunk) in stream.chunks(7).enumerate() {
        let v = arb.on_network_at(chunk, t0 + Duration::from_millis(i as u64));
        assert!(v.forward);
    }
    assert_eq!(uplink.bytes(), stream);

    let status = arb.snapshot_at(t0);
    assert_eq!(status.net_msgs, vec![(1005, 1), (1074, 1), (1084, 1)]);
    assert_eq!(status.net_bytes, stream.len() as u64);
}

#[test]
fn backup_mode_prefers_local_station() {
    let (arb, uplink) = arbiter(ForwardMode::Backup);
    let t0 = Instant::now();
    let net = frame(&message(1074, 20));

    arb.on_local_at(&frame(&station_message(7, &GeoPos::new(30.5, 114.3, 25.0))), t0);
    let mut forwarded = Vec::new();
    let mut transitions = 0;
    for s in 1..=11u64 {
        let v = arb.on_network_at(&net, t0 + Duration::from_secs(s));
        if v.forward {
            forwarded.push(s);
        }
        transitions += v.changed as u32;
    }
    assert_eq!(forwarded, vec![11]);
    // suppressed at t=1, resumed at t=11
    assert_eq!(transitions, 2);
    assert_eq!(uplink.bytes(), net);

    let status = arb.snapshot_at(t0 + Duration::from_secs(11));
    assert_eq!(status.base, BaseStatus::NoData);
    assert!(status.forward_enabled);

    // local data returns
    arb.on_local_at(&[0x00], t0 + Duration::from_secs(12));
    let v = arb.on_network_at(&net, t0 + Duration::from_secs(13));
    assert!(!v.forward);
    assert!(v.changed);
}

#[test]
fn backup_mode_reports_station_position() {
    let (arb, _) = arbiter(ForwardMode::Backup);
    assert_eq!(arb.position().unwrap(), GeoPos::new(30.0, 120.0, 10.0));

    let station = GeoPos::new(-33.8688, 151.2093, 58.0);
    arb.on_local(&frame(&station_message(12, &station)));
    let pos = arb.position().unwrap();
    assert!((pos.lat - station.lat).abs() < 1e-7);
    assert!((pos.lon - station.lon).abs() < 1e-7);
    assert!((pos.alt - station.alt).abs() < 1e-3);
    assert_eq!(arb.snapshot().base, BaseStatus::Online);
}

#[tokio::test]
async fn caster_to_uplink_end_to_end() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let corrections: Vec<u8> = [frame(&message(1005, 19)), frame(&message(1230, 8))].concat();

    let payload = corrections.clone();
    let caster = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 1024];
        let mut req = Vec::new();
        while !req.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = sock.read(&mut buf).await.unwrap();
            req.extend_from_slice(&buf[..n]);
        }
        let mut reply = b"ICY 200 OK\r\n\r\n".to_vec();
        reply.extend_from_slice(&payload[..10]);
        sock.write_all(&reply).await.unwrap();
        sock.write_all(&payload[10..]).await.unwrap();

        let mut gga = Vec::new();
        while !gga.ends_with(b"\r\n") {
            let n = sock.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            gga.extend_from_slice(&buf[..n]);
        }
        (String::from_utf8(req).unwrap(), String::from_utf8(gga).unwrap(), sock)
    });

    let (arb, uplink) = arbiter(ForwardMode::Normal);
    let arb = Arc::new(arb);
    let opt = NtripOpt {
        host: "127.0.0.1".into(),
        port,
        mountpoint: "RELAY".into(),
        username: "u".into(),
        password: "p".into(),
        read_timeout: Duration::from_millis(100),
        ..NtripOpt::default()
    };
    let session = NtripSession::start(opt, arb.clone(), arb.clone());

    let deadline = Instant::now() + Duration::from_secs(5);
    while uplink.bytes().len() < corrections.len() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(uplink.bytes(), corrections);
    assert_eq!(session.state(), SessionState::Streaming);

    let (req, gga, _sock) = caster.await.unwrap();
    assert!(req.starts_with("GET /RELAY HTTP/1.0\r\n"));
    assert!(gga.starts_with("$GPGGA,"));
    assert!(gga.contains(",3000.0000,N,12000.0000,E,4,12,"));

    session.stop().await;
}
