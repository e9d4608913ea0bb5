use std::net::SocketAddr;

use tokio::net::UdpSocket;

use super::*;
use crate::frame::{self, Flag, StreamId};
use crate::message::RpcError;

async fn respond(socket: &UdpSocket, to: SocketAddr, sid: StreamId, rid: u32, payload: &[u8]) {
    let max_fragment = 1475;
    let mut seqid = 0u16;
    for chunk in payload.chunks(max_fragment) {
        let f = frame::build(Flag::Psh, sid, rid, seqid, chunk).unwrap();
        socket.send_to(&f, to).await.unwrap();
        seqid += 1;
    }
    let dne = frame::build(Flag::Dne, sid, rid, 0, &[]).unwrap();
    socket.send_to(&dne, to).await.unwrap();
}

/// Minimal fake server: accumulates one request's PSH fragments until DNE,
/// decodes it as a `Message`, hands it to `handler`, and mirrors whatever
/// `handler` returns back as PSH fragments + DNE on the same `(sid, rid)`.
/// A `None` result drops the request, simulating a lost datagram.
async fn run_fake_server<F>(socket: UdpSocket, mut handler: F)
where
    F: FnMut(Message) -> Option<Message> + Send,
{
    let mut buf = vec![0u8; 4096];
    let mut pending: HashMap<(StreamId, u32), Vec<(u16, Vec<u8>)>> = HashMap::new();
    loop {
        let (n, from) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(_) => break,
        };
        let header = match frame::Header::parse(&buf[..n]) {
            Ok(h) => h,
            Err(_) => continue,
        };
        let key = (header.sid(), header.rid());
        match header.flag() {
            Flag::Psh => {
                pending.entry(key).or_default().push((header.seqid(), header.payload().to_vec()));
            }
            Flag::Dne => {
                let mut fragments = pending.remove(&key).unwrap_or_default();
                fragments.sort_by_key(|(seq, _)| *seq);
                let body: Vec<u8> = fragments.into_iter().flat_map(|(_, b)| b).collect();
                let request: Message = match unmarshal(&body) {
                    Ok(m) => m,
                    Err(_) => continue,
                };
                if let Some(response) = handler(request) {
                    let payload = marshal(&response);
                    respond(&socket, from, header.sid(), header.rid(), &payload).await;
                }
            }
            _ => {}
        }
    }
}

fn config_for(server_addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        remote_host: server_addr.ip().to_string(),
        remote_port: server_addr.port(),
        ..ClientConfig::default()
    }
}

#[tokio::test]
async fn test_find_flights_returns_three_flights() -> Result<()> {
    let server_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = server_socket.local_addr().unwrap();

    tokio::spawn(run_fake_server(server_socket, |req| {
        assert_eq!(req.rpc, "FindFlights");
        assert_eq!(req.query.get("source").map(String::as_str), Some("New York"));
        assert_eq!(req.query.get("destination").map(String::as_str), Some("Houston"));
        let flights = vec![
            Flight { id: 1001, ..Flight::default() },
            Flight { id: 1002, ..Flight::default() },
            Flight { id: 1003, ..Flight::default() },
        ];
        Some(Message {
            rpc: req.rpc,
            query: HashMap::new(),
            body: marshal(&flights),
            error: RpcError::default(),
        })
    }));

    let client = Client::connect(config_for(server_addr)).await?;
    let flights = client.find_flights("New York", "Houston").await?;
    assert_eq!(flights.iter().map(|f| f.id).collect::<Vec<_>>(), vec![1001, 1002, 1003]);
    Ok(())
}

#[tokio::test]
async fn test_find_flights_rejects_empty_arguments_locally() -> Result<()> {
    let client = Client::connect(ClientConfig::default()).await?;
    assert!(matches!(client.find_flights("", "Houston").await, Err(Error::InvalidArgument(_))));
    assert!(matches!(client.find_flights("New York", "").await, Err(Error::InvalidArgument(_))));
    Ok(())
}

#[tokio::test]
async fn test_reserve_success_stores_reservation() -> Result<()> {
    let server_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = server_socket.local_addr().unwrap();

    tokio::spawn(run_fake_server(server_socket, |req| {
        assert_eq!(req.rpc, "ReserveFlight");
        assert_eq!(req.query.get("id").map(String::as_str), Some("1001"));
        assert_eq!(req.query.get("seats").map(String::as_str), Some("2"));
        let reservation = ReserveFlight {
            id: "res-1".to_owned(),
            seats_reserved: 2,
            ..ReserveFlight::default()
        };
        Some(Message {
            rpc: req.rpc,
            query: HashMap::new(),
            body: marshal(&reservation),
            error: RpcError::default(),
        })
    }));

    let client = Client::connect(config_for(server_addr)).await?;
    let reservation = client.reserve("1001", 2).await?;
    assert_eq!(reservation.id, "res-1");

    let idx = client.reservations_idx().await;
    assert_eq!(idx.len(), 1);
    assert_eq!(idx[0].id, "res-1");
    Ok(())
}

#[tokio::test]
async fn test_cancel_unknown_reservation_fails_locally_without_io() -> Result<()> {
    // ClientConfig::default() points at 127.0.0.1:8080 with no server
    // listening; if cancel() opened a stream it would hang until its
    // deadline. It must not, since nothing is registered under this id.
    let client = Client::connect(ClientConfig::default()).await?;
    let err = client.cancel("does-not-exist").await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(id) if id == "does-not-exist"));
    Ok(())
}

#[tokio::test]
async fn test_fragmented_response_reassembles_out_of_order() -> Result<()> {
    let server_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = server_socket.local_addr().unwrap();
    let long_source = "A".repeat(4096);
    let expected_source = long_source.clone();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        loop {
            let (n, from) = match server_socket.recv_from(&mut buf).await {
                Ok(v) => v,
                Err(_) => break,
            };
            let header = match frame::Header::parse(&buf[..n]) {
                Ok(h) => h,
                Err(_) => continue,
            };
            if header.flag() != Flag::Dne {
                continue;
            }
            let flight = Flight {
                id: 42,
                source: long_source.clone(),
                ..Flight::default()
            };
            let response = Message {
                rpc: "FindFlight".to_owned(),
                query: HashMap::new(),
                body: marshal(&flight),
                error: RpcError::default(),
            };
            let payload = marshal(&response);
            let max_fragment = 1475;
            let frames: Vec<Vec<u8>> = payload
                .chunks(max_fragment)
                .enumerate()
                .map(|(seqid, chunk)| frame::build(Flag::Psh, header.sid(), header.rid(), seqid as u16, chunk).unwrap())
                .collect();
            assert!(frames.len() >= 3, "test fixture must span at least 3 fragments");

            for i in (0..frames.len()).rev() {
                server_socket.send_to(&frames[i], from).await.unwrap();
            }
            let dne = frame::build(Flag::Dne, header.sid(), header.rid(), 0, &[]).unwrap();
            server_socket.send_to(&dne, from).await.unwrap();
            break;
        }
    });

    let client = Client::connect(config_for(server_addr)).await?;
    let flight = client.find_flight("42").await?;
    assert_eq!(flight.source, expected_source);
    Ok(())
}

#[tokio::test]
async fn test_first_attempt_times_out_second_succeeds() -> Result<()> {
    let server_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = server_socket.local_addr().unwrap();
    let mut attempts = 0u32;

    tokio::spawn(run_fake_server(server_socket, move |req| {
        attempts += 1;
        if attempts == 1 {
            return None;
        }
        let reservation = ReserveFlight {
            id: "res-9".to_owned(),
            ..ReserveFlight::default()
        };
        Some(Message {
            rpc: req.rpc,
            query: HashMap::new(),
            body: marshal(&reservation),
            error: RpcError::default(),
        })
    }));

    let config = ClientConfig {
        retries: 2,
        deadline: Duration::from_millis(150),
        ..config_for(server_addr)
    };
    let client = Client::connect(config).await?;
    let reservation = client.reserve("1001", 1).await?;
    assert_eq!(reservation.id, "res-9");
    Ok(())
}

#[tokio::test]
async fn test_transport_failure_after_exhausting_retries() -> Result<()> {
    // Nothing is listening on this port; both attempts must time out.
    let config = ClientConfig {
        remote_host: "127.0.0.1".to_owned(),
        remote_port: 1, // reserved, nothing binds here
        retries: 2,
        deadline: Duration::from_millis(60),
        ..ClientConfig::default()
    };
    let client = Client::connect(config).await?;
    let err = client.get_meals().await.unwrap_err();
    assert!(matches!(err, Error::TransportFailure { method } if method == "GetMeals"));
    Ok(())
}

#[tokio::test]
async fn test_monitor_updates_cancel_unblocks_reader_promptly() -> Result<()> {
    let server_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = server_socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 1024];
        loop {
            if server_socket.recv_from(&mut buf).await.is_err() {
                break;
            }
        }
    });

    let client = Client::connect(config_for(server_addr)).await?;
    let mut sub = client.monitor_updates(Duration::from_secs(60)).await?;

    let outcome = tokio::time::timeout(Duration::from_millis(200), async {
        sub.cancel().await.ok();
        sub.recv().await
    })
    .await;

    assert!(outcome.is_ok(), "cancellation should unblock the reader promptly");
    assert!(outcome.unwrap().is_none());
    Ok(())
}
