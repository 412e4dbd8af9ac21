//! ZnpClient tests over an in-memory link
//!
//! The mock coordinator decodes each written frame and answers through the
//! read half, so requests travel the full encode, decode and dispatch path.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use zhub_transport::af::{AF_DATA_REQUEST, AF_INCOMING_MSG, UTIL_ADDRMGR_NWK_ADDR_LOOKUP};
use zhub_transport::{
    AfRegister, CommandType, DataRequest, FrameDecoder, IncomingMsg, Subsystem, TransportError,
    TransportEvent, TransportReceiver, TransportSender, ZnpClient, ZnpFrame,
};

type Responder = Box<dyn Fn(&ZnpFrame) -> Vec<ZnpFrame> + Send + Sync>;

struct MockSender {
    link: mpsc::UnboundedSender<TransportEvent>,
    sent: Mutex<Vec<ZnpFrame>>,
    responder: Responder,
}

#[async_trait]
impl TransportSender for MockSender {
    async fn send(&self, data: Bytes) -> zhub_transport::Result<()> {
        let mut decoder = FrameDecoder::new();
        decoder.push(&data);
        let frame = decoder.next_frame().expect("whole frame")?;
        for reply in (self.responder)(&frame) {
            let _ = self.link.send(TransportEvent::Data(reply.encode()?));
        }
        self.sent.lock().push(frame);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.link.is_closed()
    }

    async fn close(&self) -> zhub_transport::Result<()> {
        let _ = self
            .link
            .send(TransportEvent::Disconnected { reason: None });
        Ok(())
    }
}

struct MockReceiver {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for MockReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

fn start(responder: Responder) -> (ZnpClient, Arc<MockSender>, mpsc::UnboundedSender<TransportEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sender = Arc::new(MockSender {
        link: tx.clone(),
        sent: Mutex::new(Vec::new()),
        responder,
    });
    let client = ZnpClient::new(sender.clone()).with_timeout(Duration::from_millis(200));
    let reader = client.clone();
    tokio::spawn(async move { reader.run_reader(MockReceiver { rx }).await });
    (client, sender, tx)
}

fn srsp(request: &ZnpFrame, payload: Vec<u8>) -> ZnpFrame {
    ZnpFrame::new(CommandType::Srsp, request.subsystem, request.command, payload)
}

#[tokio::test]
async fn test_request_returns_srsp_payload() {
    let (client, sender, _link) = start(Box::new(|req| {
        assert_eq!(req.kind, CommandType::Sreq);
        vec![srsp(req, vec![0x79, 0x01])]
    }));

    let reply = client.request(Subsystem::Sys, 0x01, Bytes::new()).await.unwrap();
    assert_eq!(&reply[..], &[0x79, 0x01]);
    assert_eq!(sender.sent.lock().len(), 1);
}

#[tokio::test]
async fn test_request_timeout() {
    let (client, _sender, _link) = start(Box::new(|_| Vec::new()));
    let result = client.request(Subsystem::Sys, 0x01, Bytes::new()).await;
    assert!(matches!(result, Err(TransportError::Timeout)));
}

#[tokio::test]
async fn test_rpc_error_surfaces_as_protocol_error() {
    let (client, _sender, _link) = start(Box::new(|req| {
        vec![ZnpFrame::new(
            CommandType::Srsp,
            Subsystem::RpcError,
            0x00,
            vec![0x02, req.cmd0(), req.command],
        )]
    }));
    let result = client.request(Subsystem::Zdo, 0x25, Bytes::new()).await;
    assert!(matches!(result, Err(TransportError::Protocol(_))));
}

#[tokio::test]
async fn test_concurrent_requests_resolve_in_order() {
    let (client, _sender, _link) = start(Box::new(|req| vec![srsp(req, req.payload.to_vec())]));

    let (a, b) = tokio::join!(
        client.request(Subsystem::Sys, 0x02, vec![0x01]),
        client.request(Subsystem::Sys, 0x02, vec![0x02]),
    );
    assert_eq!(&a.unwrap()[..], &[0x01]);
    assert_eq!(&b.unwrap()[..], &[0x02]);
}

#[tokio::test]
async fn test_nwk_addr_lookup() {
    let (client, sender, _link) = start(Box::new(|req| {
        assert_eq!(req.subsystem, Subsystem::Util);
        assert_eq!(req.command, UTIL_ADDRMGR_NWK_ADDR_LOOKUP);
        vec![srsp(req, vec![0x19, 0xf5, 0x83, 0x01, 0x00, 0x8d, 0x15, 0x00])]
    }));

    assert_eq!(client.nwk_addr_lookup(0x7a4f).await.unwrap(), 0x00158d000183f519);
    assert_eq!(&sender.sent.lock()[0].payload[..], &[0x4f, 0x7a]);
}

#[tokio::test]
async fn test_af_data_request_status() {
    let (client, _sender, _link) = start(Box::new(|req| {
        assert_eq!(req.command, AF_DATA_REQUEST);
        // reject requests to endpoint 2
        let status = if req.payload[2] == 2 { 0xc2 } else { 0x00 };
        vec![srsp(req, vec![status])]
    }));

    let mut request = DataRequest {
        dst_addr: 0x1234,
        dst_endpoint: 1,
        src_endpoint: 1,
        cluster_id: 0x0006,
        trans_id: 1,
        options: 0,
        radius: 30,
        data: Bytes::from_static(&[0x01, 0x01, 0x01]),
    };
    assert!(client.af_data_request(&request).await.is_ok());

    request.dst_endpoint = 2;
    assert!(matches!(
        client.af_data_request(&request).await,
        Err(TransportError::Protocol(_))
    ));
}

#[tokio::test]
async fn test_events_reach_subscribers_across_chunks() {
    let (client, _sender, link) = start(Box::new(|_| Vec::new()));
    let mut events = client.subscribe();

    let mut payload = vec![0, 0, 0x06, 0x00, 0x4f, 0x7a, 1, 1, 0, 0x50, 0, 0, 0, 0, 0, 7];
    payload.push(3);
    payload.extend_from_slice(&[0x18, 0x07, 0x0b]);
    let raw = ZnpFrame::new(CommandType::Areq, Subsystem::Af, AF_INCOMING_MSG, payload)
        .encode()
        .unwrap();

    // garbage, then the frame split in two
    link.send(TransportEvent::Data(Bytes::from_static(&[0x00, 0x13]))).unwrap();
    link.send(TransportEvent::Data(raw.slice(..6))).unwrap();
    link.send(TransportEvent::Data(raw.slice(6..))).unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    let msg = IncomingMsg::decode(&frame.payload).unwrap();
    assert_eq!(msg.src_addr, 0x7a4f);
    assert_eq!(&msg.data[..], &[0x18, 0x07, 0x0b]);
}

#[tokio::test]
async fn test_wait_for_async_frame() {
    let (client, _sender, link) = start(Box::new(|_| Vec::new()));

    let waiter = {
        let client = client.clone();
        tokio::spawn(async move { client.wait_for(CommandType::Areq, Subsystem::Zdo, 0xc0).await })
    };
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let state = ZnpFrame::new(CommandType::Areq, Subsystem::Zdo, 0xc0, vec![0x09]);
    link.send(TransportEvent::Data(state.encode().unwrap())).unwrap();

    let frame = waiter.await.unwrap().unwrap();
    assert_eq!(&frame.payload[..], &[0x09]);
}

#[tokio::test]
async fn test_link_close_fails_pending_requests() {
    let (client, _sender, link) = start(Box::new(|_| Vec::new()));
    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.request(Subsystem::Sys, 0x01, Bytes::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    link.send(TransportEvent::Disconnected { reason: None }).unwrap();

    assert!(matches!(
        pending.await.unwrap(),
        Err(TransportError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn test_startup_sequence() {
    let (client, sender, _link) = start(Box::new(|req| match (req.subsystem, req.command) {
        (Subsystem::Sys, 0x01) => vec![srsp(req, vec![0x79, 0x01])],
        (Subsystem::Zdo, 0x40) => vec![srsp(req, vec![0x00])],
        // already registered
        (Subsystem::Af, 0x00) => vec![srsp(req, vec![0xb8])],
        _ => Vec::new(),
    }));

    assert_eq!(client.ping().await.unwrap(), 0x0179);
    assert_eq!(client.startup_from_app(100).await.unwrap(), 0);
    let register = AfRegister {
        endpoint: 1,
        profile_id: 0x0104,
        device_id: 0x0005,
        device_version: 0,
        latency: 0,
        input_clusters: vec![0x0006],
        output_clusters: Vec::new(),
    };
    client.af_register(&register).await.unwrap();

    let sent = sender.sent.lock();
    assert_eq!(&sent[1].payload[..], &[100, 0]);
    assert_eq!(sent[2].payload[0], 1);
}
