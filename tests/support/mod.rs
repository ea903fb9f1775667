//! In-process SSH servers for exercising chain authentication and
//! forwarding over real handshakes on loopback sockets.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand_core::OsRng;
use russh::keys::{Algorithm, PrivateKey};
use russh::server::{Auth, Config, Msg, Server, Session};
use russh::Channel;
use tokio::net::{TcpListener, TcpStream};

pub const USER: &str = "ops";
pub const PASSWORD: &str = "secret";

/// Authentication traffic observed by one server, shared with the test body.
#[derive(Default)]
pub struct AuthLog {
    pub attempts: AtomicUsize,
    pub successes: AtomicUsize,
}

impl AuthLog {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn successes(&self) -> usize {
        self.successes.load(Ordering::SeqCst)
    }
}

pub struct SshServer {
    pub addr: SocketAddr,
    pub auth: Arc<AuthLog>,
}

/// Start a password-authenticated SSH server on an ephemeral loopback port.
///
/// When `accept_password` is false every authentication attempt is rejected.
/// `direct-tcpip` channel requests are relayed to their target over plain
/// TCP, so a chain can reach a second loopback server through this one.
pub async fn spawn_ssh_server(accept_password: bool) -> SshServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let auth = Arc::new(AuthLog::default());

    let config = Arc::new(Config {
        keys: vec![PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap()],
        auth_rejection_time: Duration::from_millis(10),
        auth_rejection_time_initial: Some(Duration::ZERO),
        ..Default::default()
    });

    let mut runner = Runner {
        accept_password,
        auth: Arc::clone(&auth),
    };
    tokio::spawn(async move {
        let _ = runner.run_on_socket(config, &listener).await;
    });

    SshServer { addr, auth }
}

#[derive(Clone)]
struct Runner {
    accept_password: bool,
    auth: Arc<AuthLog>,
}

impl Server for Runner {
    type Handler = ServerHandler;

    fn new_client(&mut self, _peer_addr: Option<SocketAddr>) -> ServerHandler {
        ServerHandler {
            accept_password: self.accept_password,
            auth: Arc::clone(&self.auth),
        }
    }
}

struct ServerHandler {
    accept_password: bool,
    auth: Arc<AuthLog>,
}

impl russh::server::Handler for ServerHandler {
    type Error = russh::Error;

    async fn auth_password(
        &mut self,
        user: &str,
        password: &str,
    ) -> Result<Auth, Self::Error> {
        self.auth.attempts.fetch_add(1, Ordering::SeqCst);
        if self.accept_password && user == USER && password == PASSWORD {
            self.auth.successes.fetch_add(1, Ordering::SeqCst);
            Ok(Auth::Accept)
        } else {
            Ok(Auth::Reject {
                proceed_with_methods: None,
                partial_success: false,
            })
        }
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let target = (host_to_connect.to_string(), port_to_connect as u16);
        tokio::spawn(async move {
            let Ok(mut outbound) = TcpStream::connect(target).await else {
                return;
            };
            let mut inbound = channel.into_stream();
            let _ = tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await;
        });
        Ok(true)
    }
}

/// Serve every accepted connection by echoing its bytes back, for use as a
/// forwarding target.
pub async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}
