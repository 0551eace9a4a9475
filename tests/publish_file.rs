//! End-to-end publishing against an in-process RTMP server

use std::io::Write;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use flv_push::amf::AmfValue;
use flv_push::client::{publish_file, DispatchMode, PublishConfig};
use flv_push::error::{Error, ErrorKind};
use flv_push::media::flv::encode_time;
use flv_push::protocol::constants::*;
use flv_push::protocol::{ChunkDecoder, ChunkEncoder, Command, RtmpMessage};

/// Accept one publisher, answer its setup commands and collect every
/// message it sends until it hangs up.
async fn run_server(listener: TcpListener) -> Vec<RtmpMessage> {
    let (mut socket, _) = listener.accept().await.unwrap();

    let mut c0c1 = vec![0u8; 1 + HANDSHAKE_SIZE];
    socket.read_exact(&mut c0c1).await.unwrap();
    let mut s0s1s2 = vec![RTMP_VERSION];
    s0s1s2.extend_from_slice(&[0u8; HANDSHAKE_SIZE]);
    s0s1s2.extend_from_slice(&c0c1[1..]);
    socket.write_all(&s0s1s2).await.unwrap();
    let mut c2 = vec![0u8; HANDSHAKE_SIZE];
    socket.read_exact(&mut c2).await.unwrap();

    let encoder = ChunkEncoder::new();
    let mut decoder = ChunkDecoder::new();
    let mut buf = BytesMut::with_capacity(64 * 1024);
    let mut received = Vec::new();

    loop {
        while let Some(msg) = decoder.decode(&mut buf).unwrap() {
            if msg.type_id == MSG_SET_CHUNK_SIZE {
                decoder.set_chunk_size(msg.control_value().unwrap()).unwrap();
            }
            if msg.type_id == MSG_COMMAND_AMF0 {
                let cmd = Command::parse(&msg.payload).unwrap();
                if let Some(reply) = reply_to(&cmd) {
                    let mut out = BytesMut::new();
                    encoder.encode(&RtmpMessage::command(msg.stream_id, &reply), &mut out);
                    socket.write_all(&out).await.unwrap();
                }
            }
            received.push(msg);
        }
        match socket.read_buf(&mut buf).await {
            Ok(0) | Err(_) => return received,
            Ok(_) => {}
        }
    }
}

fn reply_to(cmd: &Command) -> Option<Command> {
    let status = |code: &str| {
        vec![AmfValue::object([
            ("level", "status"),
            ("code", code),
            ("description", "ok"),
        ])]
    };

    match cmd.name.as_str() {
        CMD_CONNECT => Some(Command::new(
            CMD_RESULT,
            cmd.transaction_id,
            AmfValue::object([("fmsVer", "FMS/3,0,1,123")]),
            status("NetConnection.Connect.Success"),
        )),
        CMD_CREATE_STREAM => Some(Command::new(
            CMD_RESULT,
            cmd.transaction_id,
            AmfValue::Null,
            vec![AmfValue::Number(1.0)],
        )),
        CMD_PUBLISH => Some(Command::new(
            CMD_ON_STATUS,
            0.0,
            AmfValue::Null,
            status(NS_PUBLISH_START),
        )),
        _ => None,
    }
}

fn flv(tags: &[(u8, u32, &[u8])]) -> Vec<u8> {
    let mut out = b"FLV\x01\x05\x00\x00\x00\x09".to_vec();
    out.extend_from_slice(&[0, 0, 0, 0]);
    for (tag_type, timestamp, payload) in tags {
        let len = payload.len() as u32;
        out.push(*tag_type);
        out.extend_from_slice(&len.to_be_bytes()[1..]);
        out.extend_from_slice(&encode_time(*timestamp));
        out.extend_from_slice(&[0, 0, 0]);
        out.extend_from_slice(payload);
        out.extend_from_slice(&(11 + len).to_be_bytes());
    }
    out
}

fn sample_file() -> tempfile::NamedTempFile {
    write_file(&sample_data())
}

fn write_file(data: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(data).unwrap();
    file.flush().unwrap();
    file
}

fn sample_data() -> Vec<u8> {
    let big_keyframe: Vec<u8> = std::iter::once(0x17).chain((0..6000).map(|i| i as u8)).collect();
    flv(&[
        (18, 0, &[0x02, 0x00, 0x0A, b'o', b'n', b'M', b'e', b't', b'a', b'D', b'a', b't', b'a']),
        (8, 0, &[0xAF, 0x00, 0x12, 0x10]),
        (9, 0, &big_keyframe),
        (9, 40, &[0x27, 0x01, 0x00, 0x00, 0x00]),
        (8, 40, &[0xAF, 0x01, 0x21]),
    ])
}

fn config(port: u16, mode: DispatchMode) -> PublishConfig {
    PublishConfig::new(format!("rtmp://127.0.0.1:{}/live/test", port))
        .mode(mode)
        .connect_timeout(Duration::from_secs(5))
        .throttle_quantum(Duration::from_millis(10))
}

fn media(received: &[RtmpMessage]) -> Vec<(u8, u32, usize)> {
    received
        .iter()
        .filter(|m| matches!(m.type_id, MSG_AUDIO | MSG_VIDEO | MSG_DATA_AMF0))
        .map(|m| (m.type_id, m.timestamp, m.payload.len()))
        .collect()
}

async fn publish(mode: DispatchMode) -> Vec<RtmpMessage> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(run_server(listener));

    let file = sample_file();
    let stats = publish_file(file.path(), &config(port, mode)).await.unwrap();

    assert_eq!(stats.tags_sent, 4);
    assert_eq!(stats.skipped_tags, 1);
    assert_eq!(stats.keyframes, 1);
    assert_eq!(stats.last_timestamp, 40);

    server.await.unwrap()
}

#[tokio::test]
async fn test_publish_packet_mode() {
    let received = publish(DispatchMode::Packet).await;

    assert_eq!(
        media(&received),
        vec![
            (MSG_AUDIO, 0, 4),
            (MSG_VIDEO, 0, 6001),
            (MSG_VIDEO, 40, 5),
            (MSG_AUDIO, 40, 3)
        ]
    );
    assert!(received
        .iter()
        .filter(|m| m.type_id == MSG_VIDEO)
        .all(|m| m.stream_id == 1));

    let names: Vec<String> = received
        .iter()
        .filter(|m| m.type_id == MSG_COMMAND_AMF0)
        .map(|m| Command::parse(&m.payload).unwrap().name)
        .collect();
    assert_eq!(names.first().map(String::as_str), Some(CMD_CONNECT));
    assert_eq!(names.last().map(String::as_str), Some(CMD_DELETE_STREAM));
}

#[tokio::test]
async fn test_publish_raw_mode() {
    let received = publish(DispatchMode::Raw).await;

    assert_eq!(
        media(&received),
        vec![
            (MSG_AUDIO, 0, 4),
            (MSG_VIDEO, 0, 6001),
            (MSG_VIDEO, 40, 5),
            (MSG_AUDIO, 40, 3)
        ]
    );
}

#[tokio::test]
async fn test_truncated_tail_exits_cleanly() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(run_server(listener));

    // Last audio tag loses a payload byte and its trailer
    let mut data = sample_data();
    data.truncate(data.len() - 5);
    let file = write_file(&data);

    let err = publish_file(file.path(), &config(port, DispatchMode::Packet))
        .await
        .unwrap_err();

    match &err {
        Error::Interrupted(inner) => assert!(matches!(**inner, Error::MalformedTag { .. })),
        other => panic!("expected an interrupted run, got {:?}", other),
    }
    assert_eq!(err.kind(), ErrorKind::LocalFile);
    assert_eq!(err.exit_code(), 0);

    let received = server.await.unwrap();
    assert_eq!(
        media(&received),
        vec![(MSG_AUDIO, 0, 4), (MSG_VIDEO, 0, 6001), (MSG_VIDEO, 40, 5)]
    );
}

#[tokio::test]
async fn test_connection_refused() {
    // Grab a free port, then close it
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let file = sample_file();
    let err = publish_file(file.path(), &config(port, DispatchMode::Packet))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::SessionUnavailable(_)));
    assert!(!err.is_interrupted());
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn test_server_never_answers() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let holder = tokio::spawn(async move {
        let (socket, _): (TcpStream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        drop(socket);
    });

    let file = sample_file();
    let config = config(port, DispatchMode::Packet).connect_timeout(Duration::from_millis(200));
    let err = publish_file(file.path(), &config).await.unwrap_err();

    assert!(matches!(err, Error::SessionUnavailable(_)));
    holder.abort();
}

#[tokio::test]
async fn test_missing_input_file() {
    let err = publish_file(
        "/nonexistent/flv-push/input.flv",
        &config(1935, DispatchMode::Packet),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::OpenSource { .. }));
    assert_eq!(err.kind(), ErrorKind::LocalFile);
    assert_eq!(err.exit_code(), 1);
}

#[tokio::test]
async fn test_bad_url() {
    let file = sample_file();
    let config = PublishConfig::new("rtmp://127.0.0.1/live");
    let err = publish_file(file.path(), &config).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Config);
}
