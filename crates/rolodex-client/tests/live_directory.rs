//! End-to-end tests against a scripted in-process server.
//!
//! Each test binds a loopback listener, accepts the client's connection, and
//! plays the server side of the protocol with real frames. The assertions
//! cover both directions: what the client puts on the wire, and how it
//! surfaces what the server sends back.

use bytes::BytesMut;
use rolodex_client::{
    AuthState, BindCredentials, Directory, DirectoryConfig, Error, Query, ResultCode, SearchScope,
    Session, SessionConfig,
};
use rolodex_proto::control::PagedResults;
use rolodex_proto::message::{
    ExtendedResponse, LdapResult, PartialAttribute, SearchRequest, SearchResultEntry,
    UNSOLICITED_ID,
};
use rolodex_proto::{frame_len, Control, LdapMessage, ProtocolOp};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

struct ServerConn {
    socket: TcpStream,
    buf: BytesMut,
}

impl ServerConn {
    async fn accept(listener: &TcpListener) -> Self {
        let (socket, _) = listener.accept().await.unwrap();
        Self {
            socket,
            buf: BytesMut::with_capacity(8 * 1024),
        }
    }

    /// Next frame from the client, or `None` on a clean EOF.
    async fn read(&mut self) -> Option<LdapMessage> {
        loop {
            if let Some(len) = frame_len(&self.buf).unwrap() {
                if self.buf.len() >= len {
                    let frame = self.buf.split_to(len);
                    return Some(LdapMessage::decode(&frame).unwrap());
                }
            }
            if self.socket.read_buf(&mut self.buf).await.unwrap() == 0 {
                assert!(self.buf.is_empty(), "EOF inside a frame");
                return None;
            }
        }
    }

    async fn write(&mut self, message: LdapMessage) {
        self.socket.write_all(&message.encode()).await.unwrap();
    }

    /// Reads a bind request, answers it with `code`, and returns the
    /// presented name and password.
    async fn serve_bind(&mut self, code: ResultCode) -> (String, Vec<u8>) {
        let message = self.read().await.expect("bind request");
        let bind = match message.op {
            ProtocolOp::BindRequest(bind) => bind,
            other => panic!("expected a bind request, got {}", other.name()),
        };
        assert_eq!(bind.version, 3);
        self.write(LdapMessage::new(
            message.id,
            ProtocolOp::BindResponse(LdapResult::of(code, "")),
        ))
        .await;
        (bind.name, bind.password)
    }

    async fn read_search(&mut self) -> (i32, SearchRequest, Vec<Control>) {
        let message = self.read().await.expect("search request");
        let request = match message.op {
            ProtocolOp::SearchRequest(request) => request,
            other => panic!("expected a search request, got {}", other.name()),
        };
        (message.id, request, message.controls)
    }

    async fn send_entry(&mut self, id: i32, dn: &str, attributes: Vec<PartialAttribute>) {
        self.write(LdapMessage::new(
            id,
            ProtocolOp::SearchResultEntry(SearchResultEntry {
                dn: dn.to_string(),
                attributes,
            }),
        ))
        .await;
    }

    async fn send_done(&mut self, id: i32, result: LdapResult) {
        self.write(LdapMessage::new(id, ProtocolOp::SearchResultDone(result)))
            .await;
    }

    /// A success result carrying a paged results cookie; empty ends paging.
    async fn send_paged_done(&mut self, id: i32, cookie: &[u8]) {
        self.write(LdapMessage::with_controls(
            id,
            ProtocolOp::SearchResultDone(LdapResult::success()),
            vec![PagedResults {
                size: 0,
                cookie: cookie.to_vec(),
            }
            .control()],
        ))
        .await;
    }

    async fn expect_unbind_and_eof(&mut self) {
        let message = self.read().await.expect("unbind request");
        assert!(matches!(message.op, ProtocolOp::UnbindRequest));
        assert!(self.read().await.is_none());
    }
}

async fn listen() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

fn config(addr: SocketAddr) -> SessionConfig {
    SessionConfig::new(
        format!("ldap://{addr}"),
        BindCredentials::new("cn=admin,dc=example,dc=com", "secret"),
        "dc=example,dc=com".parse().unwrap(),
    )
    .unwrap()
    .with_operation_timeout(5)
}

fn person(account: &str) -> Vec<PartialAttribute> {
    vec![
        PartialAttribute::new("objectClass", vec!["top", "person", "user"]),
        PartialAttribute::new("cn", vec![account]),
        PartialAttribute::new("sAMAccountName", vec![account]),
    ]
}

#[tokio::test]
async fn connect_binds_and_close_unbinds() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let mut conn = ServerConn::accept(&listener).await;
        let (name, password) = conn.serve_bind(ResultCode::Success).await;
        assert_eq!(name, "cn=admin,dc=example,dc=com");
        assert_eq!(password, b"secret");
        conn.expect_unbind_and_eof().await;
    });

    let session = Session::connect(config(addr)).await.unwrap();
    assert_eq!(session.state(), AuthState::Authenticated);
    session.close().await;

    server.await.unwrap();
}

#[tokio::test]
async fn rejected_bind_leaves_the_session_usable() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let mut conn = ServerConn::accept(&listener).await;
        conn.serve_bind(ResultCode::InvalidCredentials).await;
        conn.serve_bind(ResultCode::Success).await;
        conn
    });

    let session = Session::open(config(addr)).await.unwrap();
    assert_eq!(session.state(), AuthState::Unauthenticated);

    let err = session
        .bind(&BindCredentials::new("cn=admin,dc=example,dc=com", "typo"))
        .await
        .unwrap_err();
    assert!(err.is_authentication());
    assert_eq!(err.result_code(), Some(ResultCode::InvalidCredentials));
    assert_eq!(session.state(), AuthState::Failed);

    session
        .bind(&BindCredentials::new("cn=admin,dc=example,dc=com", "secret"))
        .await
        .unwrap();
    assert_eq!(session.state(), AuthState::Authenticated);

    drop(server.await.unwrap());
}

#[tokio::test]
async fn unreachable_server_is_a_connection_error() {
    let (listener, addr) = listen().await;
    drop(listener);

    let err = Session::connect(config(addr)).await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
    assert!(!err.is_authentication());
}

#[tokio::test]
async fn search_streams_entries_and_skips_references() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let mut conn = ServerConn::accept(&listener).await;
        conn.serve_bind(ResultCode::Success).await;

        let (id, request, controls) = conn.read_search().await;
        assert_eq!(request.base, "dc=example,dc=com");
        assert_eq!(request.scope, SearchScope::Subtree);
        assert_eq!(request.filter.to_string(), "(cn=jdoe)");
        assert!(request.attributes.is_empty());
        let page = PagedResults::find(&controls).unwrap().expect("paging");
        assert_eq!(page.size, 500);
        assert!(page.cookie.is_empty());

        conn.send_entry(id, "cn=jdoe,ou=People,dc=example,dc=com", person("jdoe"))
            .await;
        conn.write(LdapMessage::new(
            id,
            ProtocolOp::SearchResultReference(vec![
                "ldap://other.example.com/ou=Elsewhere".to_string()
            ]),
        ))
        .await;
        conn.send_entry(id, "cn=jdoe2,ou=People,dc=example,dc=com", person("jdoe2"))
            .await;
        conn.send_done(id, LdapResult::success()).await;
        conn
    });

    let session = Session::connect(config(addr)).await.unwrap();
    let query = Query::parse("(cn=jdoe)").unwrap().build();
    let entries = session.search(&query).unwrap().entries().await.unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].first("sAMAccountName"), Some("jdoe"));
    assert_eq!(entries[1].first("sAMAccountName"), Some("jdoe2"));

    drop(server.await.unwrap());
}

#[tokio::test]
async fn empty_result_is_not_an_error() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let mut conn = ServerConn::accept(&listener).await;
        conn.serve_bind(ResultCode::Success).await;
        let (id, _, _) = conn.read_search().await;
        conn.send_done(id, LdapResult::success()).await;
        conn
    });

    let session = Session::connect(config(addr)).await.unwrap();
    let query = Query::parse("(cn=nobody)").unwrap().build();
    let entries = session.search(&query).unwrap().entries().await.unwrap();
    assert!(entries.is_empty());

    drop(server.await.unwrap());
}

#[tokio::test]
async fn missing_base_is_a_query_error() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let mut conn = ServerConn::accept(&listener).await;
        conn.serve_bind(ResultCode::Success).await;
        let (id, _, _) = conn.read_search().await;
        conn.send_done(id, LdapResult::of(ResultCode::NoSuchObject, "no such base"))
            .await;
        conn
    });

    let session = Session::connect(config(addr)).await.unwrap();
    let query = Query::parse("(cn=jdoe)").unwrap().build();
    let err = session.search(&query).unwrap().entries().await.unwrap_err();

    assert!(err.is_no_such_object());
    assert!(matches!(err, Error::Query { .. }));

    drop(server.await.unwrap());
}

#[tokio::test]
async fn size_limit_surfaces_after_the_delivered_entries() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let mut conn = ServerConn::accept(&listener).await;
        conn.serve_bind(ResultCode::Success).await;
        let (id, _, _) = conn.read_search().await;
        conn.send_entry(id, "cn=jdoe,ou=People,dc=example,dc=com", person("jdoe"))
            .await;
        conn.send_done(id, LdapResult::of(ResultCode::SizeLimitExceeded, "too many"))
            .await;
        conn
    });

    let session = Session::connect(config(addr)).await.unwrap();
    let query = Query::parse("(objectClass=user)").unwrap().build();
    let mut stream = session.search(&query).unwrap();

    let first = stream.next().await.unwrap().expect("first entry");
    assert_eq!(first.first("sAMAccountName"), Some("jdoe"));

    let err = stream.next().await.unwrap_err();
    assert_eq!(err.result_code(), Some(ResultCode::SizeLimitExceeded));

    drop(server.await.unwrap());
}

#[tokio::test]
async fn paged_search_walks_the_cookie_chain() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let mut conn = ServerConn::accept(&listener).await;
        conn.serve_bind(ResultCode::Success).await;

        let (id, _, controls) = conn.read_search().await;
        let page = PagedResults::find(&controls).unwrap().expect("paging");
        assert_eq!(page.size, 2);
        assert!(page.cookie.is_empty());
        conn.send_entry(id, "cn=p1,dc=example,dc=com", person("p1")).await;
        conn.send_entry(id, "cn=p2,dc=example,dc=com", person("p2")).await;
        conn.send_paged_done(id, b"abc").await;

        let (id, _, controls) = conn.read_search().await;
        let page = PagedResults::find(&controls).unwrap().expect("paging");
        assert_eq!(page.cookie, b"abc");
        conn.send_entry(id, "cn=p3,dc=example,dc=com", person("p3")).await;
        conn.send_entry(id, "cn=p4,dc=example,dc=com", person("p4")).await;
        conn.send_paged_done(id, b"xyz").await;

        let (id, _, controls) = conn.read_search().await;
        let page = PagedResults::find(&controls).unwrap().expect("paging");
        assert_eq!(page.cookie, b"xyz");
        conn.send_entry(id, "cn=p5,dc=example,dc=com", person("p5")).await;
        conn.send_paged_done(id, b"").await;
        conn
    });

    let session = Session::connect(config(addr)).await.unwrap();
    let query = Query::parse("(objectClass=user)").unwrap().page_size(2).build();
    let entries = session.search(&query).unwrap().entries().await.unwrap();

    let accounts: Vec<_> = entries
        .iter()
        .map(|entry| entry.first("sAMAccountName").unwrap().to_string())
        .collect();
    assert_eq!(accounts, ["p1", "p2", "p3", "p4", "p5"]);

    drop(server.await.unwrap());
}

#[tokio::test]
async fn concurrent_searches_keep_their_responses_apart() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let mut conn = ServerConn::accept(&listener).await;
        conn.serve_bind(ResultCode::Success).await;

        let (first_id, first, _) = conn.read_search().await;
        let (second_id, second, _) = conn.read_search().await;
        let (berlin, tokyo) = if first.base.contains("Berlin") {
            (first_id, second_id)
        } else {
            assert!(second.base.contains("Berlin"));
            (second_id, first_id)
        };

        // Answers crossed on purpose: each stream must only see its own.
        conn.send_entry(tokyo, "cn=yuki,ou=Tokyo,dc=example,dc=com", person("yuki"))
            .await;
        conn.send_entry(berlin, "cn=hans,ou=Berlin,dc=example,dc=com", person("hans"))
            .await;
        conn.send_done(tokyo, LdapResult::success()).await;
        conn.send_done(berlin, LdapResult::success()).await;
        conn
    });

    let session = Session::connect(config(addr)).await.unwrap();
    let berlin = Query::parse("(objectClass=user)")
        .unwrap()
        .base("ou=Berlin,dc=example,dc=com".parse().unwrap())
        .build();
    let tokyo = Query::parse("(objectClass=user)")
        .unwrap()
        .base("ou=Tokyo,dc=example,dc=com".parse().unwrap())
        .build();

    let berlin_stream = session.search(&berlin).unwrap();
    let tokyo_stream = session.search(&tokyo).unwrap();
    let (berlin_entries, tokyo_entries) =
        tokio::join!(berlin_stream.entries(), tokyo_stream.entries());

    let berlin_entries = berlin_entries.unwrap();
    let tokyo_entries = tokyo_entries.unwrap();
    assert_eq!(berlin_entries.len(), 1);
    assert_eq!(berlin_entries[0].first("sAMAccountName"), Some("hans"));
    assert_eq!(tokyo_entries.len(), 1);
    assert_eq!(tokyo_entries[0].first("sAMAccountName"), Some("yuki"));

    drop(server.await.unwrap());
}

#[tokio::test]
async fn slow_search_times_out_without_poisoning_the_session() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let mut conn = ServerConn::accept(&listener).await;
        conn.serve_bind(ResultCode::Success).await;

        // First search: read it and answer nothing.
        let _ = conn.read_search().await;

        // Second search: served normally.
        let (id, _, _) = conn.read_search().await;
        conn.send_done(id, LdapResult::success()).await;
        conn
    });

    let session = Session::connect(config(addr)).await.unwrap();

    let slow = Query::parse("(cn=slow)")
        .unwrap()
        .timeout(Duration::from_millis(100))
        .build();
    let err = session.search(&slow).unwrap().entries().await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));

    let quick = Query::parse("(cn=quick)").unwrap().build();
    let entries = session.search(&quick).unwrap().entries().await.unwrap();
    assert!(entries.is_empty());

    drop(server.await.unwrap());
}

#[tokio::test]
async fn dropping_the_session_releases_the_transport() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let mut conn = ServerConn::accept(&listener).await;
        conn.serve_bind(ResultCode::Success).await;
        conn.expect_unbind_and_eof().await;
    });

    let session = Session::connect(config(addr)).await.unwrap();
    drop(session);

    server.await.unwrap();
}

#[tokio::test]
async fn disconnection_notice_fails_pending_searches() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let mut conn = ServerConn::accept(&listener).await;
        conn.serve_bind(ResultCode::Success).await;
        let _ = conn.read_search().await;
        conn.write(LdapMessage::new(
            UNSOLICITED_ID,
            ProtocolOp::ExtendedResponse(ExtendedResponse::disconnection_notice(
                ResultCode::Unavailable,
                "maintenance window",
            )),
        ))
        .await;
        conn
    });

    let session = Session::connect(config(addr)).await.unwrap();
    let query = Query::parse("(cn=jdoe)").unwrap().build();
    let err = session.search(&query).unwrap().entries().await.unwrap_err();
    assert_eq!(err, Error::SessionClosed);

    // The driver is gone; new operations fail, at latest on first poll.
    let err = match session.search(&query) {
        Err(err) => err,
        Ok(stream) => stream.entries().await.unwrap_err(),
    };
    assert_eq!(err, Error::SessionClosed);

    drop(server.await.unwrap());
}

#[tokio::test]
async fn authenticate_verifies_the_password_on_a_fresh_bind() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let mut admin = ServerConn::accept(&listener).await;
        admin.serve_bind(ResultCode::Success).await;
        let (id, request, _) = admin.read_search().await;
        assert!(request.filter.to_string().contains("(sAMAccountName=jdoe)"));
        admin
            .send_entry(id, "cn=jdoe,ou=People,dc=example,dc=com", person("jdoe"))
            .await;
        admin.send_done(id, LdapResult::success()).await;

        // The credential check arrives on its own connection.
        let mut check = ServerConn::accept(&listener).await;
        let (name, password) = check.serve_bind(ResultCode::Success).await;
        assert_eq!(name, "cn=jdoe,ou=People,dc=example,dc=com");
        assert_eq!(password, b"hunter2");
        check.expect_unbind_and_eof().await;
        admin
    });

    let session = Session::connect(config(addr)).await.unwrap();
    let directory = Directory::new(session, DirectoryConfig::new());
    assert!(directory.authenticate("jdoe", "hunter2").await.unwrap());

    drop(server.await.unwrap());
}

#[tokio::test]
async fn authenticate_reports_a_rejected_password_as_false() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let mut admin = ServerConn::accept(&listener).await;
        admin.serve_bind(ResultCode::Success).await;
        let (id, _, _) = admin.read_search().await;
        admin
            .send_entry(id, "cn=jdoe,ou=People,dc=example,dc=com", person("jdoe"))
            .await;
        admin.send_done(id, LdapResult::success()).await;

        let mut check = ServerConn::accept(&listener).await;
        check.serve_bind(ResultCode::InvalidCredentials).await;
        check.expect_unbind_and_eof().await;
        admin
    });

    let session = Session::connect(config(addr)).await.unwrap();
    let directory = Directory::new(session, DirectoryConfig::new());
    assert!(!directory.authenticate("jdoe", "wrong").await.unwrap());

    drop(server.await.unwrap());
}
