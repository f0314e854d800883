//! Channel membership: keyed joins, parts, quits, topics, modes, WHO.

mod common;

use common::TestServer;
use std::time::Duration;

#[tokio::test]
async fn test_keyed_join_scenario() {
    let server = TestServer::spawn(21201).await.expect("spawn server");

    let mut alice = server.connect("alice").await.unwrap();
    alice.register().await.unwrap();
    alice.send_raw("JOIN #secret s3cret").await.unwrap();
    let lines = alice.recv_until(|l| l.contains(" 366 ")).await.unwrap();
    assert!(lines.iter().any(|l| l.starts_with(":alice!alice@") && l.ends_with("JOIN :#secret")));
    assert!(lines.iter().any(|l| l.contains(" 331 alice #secret :No topic is set")));
    assert!(lines.iter().any(|l| l.contains(" 353 alice = #secret :alice")));

    let mut bob = server.connect("bob").await.unwrap();
    bob.register().await.unwrap();

    bob.send_raw("JOIN #secret wrong").await.unwrap();
    assert_eq!(
        bob.recv().await.unwrap(),
        ":localhost 475 bob #secret :Cannot join channel (+k) - bad key"
    );

    // No key against a keyed room is refused too.
    bob.send_raw("JOIN #secret").await.unwrap();
    assert_eq!(
        bob.recv().await.unwrap(),
        ":localhost 475 bob #secret :Cannot join channel (+k) - bad key"
    );

    bob.send_raw("JOIN #secret s3cret").await.unwrap();
    let lines = bob.recv_until(|l| l.contains(" 366 ")).await.unwrap();
    assert!(lines.iter().any(|l| l.starts_with(":bob!bob@") && l.ends_with("JOIN :#secret")));

    let joined = alice.recv().await.unwrap();
    assert!(joined.starts_with(":bob!bob@") && joined.ends_with("JOIN :#secret"));
}

#[tokio::test]
async fn test_part_and_quit_broadcasts() {
    let server = TestServer::spawn(21202).await.expect("spawn server");

    let mut alice = server.connect("alice").await.unwrap();
    alice.register().await.unwrap();
    alice.send_raw("JOIN #room").await.unwrap();
    alice.recv_until(|l| l.contains(" 366 ")).await.unwrap();

    let mut bob = server.connect("bob").await.unwrap();
    bob.register().await.unwrap();
    bob.send_raw("JOIN #room").await.unwrap();
    bob.recv_until(|l| l.contains(" 366 ")).await.unwrap();
    alice.recv().await.unwrap(); // bob's JOIN

    bob.send_raw("PART #room").await.unwrap();
    let parted = alice.recv().await.unwrap();
    assert!(parted.starts_with(":bob!bob@"));
    assert!(parted.contains("PART #room"));

    // WHO no longer lists bob.
    alice.send_raw("WHO #room").await.unwrap();
    let lines = alice.recv_until(|l| l.contains(" 315 ")).await.unwrap();
    assert!(lines.iter().any(|l| l.contains(" 352 alice #room alice ")));
    assert!(!lines.iter().any(|l| l.contains(" bob ")));

    // A disconnect produces exactly one PART for the remaining member.
    bob.send_raw("JOIN #room").await.unwrap();
    bob.recv_until(|l| l.contains(" 366 ")).await.unwrap();
    alice.recv().await.unwrap(); // bob's JOIN
    bob.send_raw("QUIT").await.unwrap();
    let parted = alice.recv().await.unwrap();
    assert!(parted.starts_with(":bob!bob@"));
    assert!(parted.contains("PART #room"));
    alice
        .expect_silence(Duration::from_millis(300))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_topic_flow() {
    let server = TestServer::spawn(21203).await.expect("spawn server");

    let mut alice = server.connect("alice").await.unwrap();
    alice.register().await.unwrap();
    alice.send_raw("JOIN #room").await.unwrap();
    alice.recv_until(|l| l.contains(" 366 ")).await.unwrap();

    let mut bob = server.connect("bob").await.unwrap();
    bob.register().await.unwrap();
    bob.send_raw("JOIN #room").await.unwrap();
    bob.recv_until(|l| l.contains(" 366 ")).await.unwrap();
    alice.recv().await.unwrap(); // bob's JOIN

    alice.send_raw("TOPIC #room :team standup").await.unwrap();
    let topic = alice.recv().await.unwrap();
    assert!(topic.starts_with(":alice!alice@"));
    assert!(topic.ends_with("TOPIC #room :team standup"));
    let topic = bob.recv().await.unwrap();
    assert!(topic.ends_with("TOPIC #room :team standup"));

    bob.send_raw("TOPIC #room").await.unwrap();
    assert_eq!(
        bob.recv().await.unwrap(),
        ":localhost 332 bob #room :team standup"
    );

    // A later join sees the topic instead of 331.
    let mut carol = server.connect("carol").await.unwrap();
    carol.register().await.unwrap();
    carol.send_raw("JOIN #room").await.unwrap();
    let lines = carol.recv_until(|l| l.contains(" 366 ")).await.unwrap();
    assert!(lines.iter().any(|l| l.contains(" 332 carol #room :team standup")));

    bob.send_raw("TOPIC #missing :x").await.unwrap();
    assert_eq!(
        bob.recv().await.unwrap(),
        ":localhost 403 bob #missing :No such channel"
    );
}

#[tokio::test]
async fn test_mode_surface() {
    let server = TestServer::spawn(21204).await.expect("spawn server");
    let mut alice = server.connect("alice").await.unwrap();
    alice.register().await.unwrap();
    alice.send_raw("JOIN #room").await.unwrap();
    alice.recv_until(|l| l.contains(" 366 ")).await.unwrap();

    alice.send_raw("MODE #room").await.unwrap();
    assert_eq!(alice.recv().await.unwrap(), "324 alice #room +");
    assert_eq!(alice.recv().await.unwrap(), "329 alice #room 0");

    alice.send_raw("MODE #room +k sesame").await.unwrap();
    alice.send_raw("MODE #room").await.unwrap();
    assert_eq!(alice.recv().await.unwrap(), "324 alice #room +k");
    assert_eq!(alice.recv().await.unwrap(), "329 alice #room 0");

    alice.send_raw("MODE #room +b").await.unwrap();
    assert_eq!(
        alice.recv().await.unwrap(),
        ":localhost 368 alice #room :End of channel ban list"
    );
    alice.send_raw("MODE #room +o alice").await.unwrap();
    assert_eq!(
        alice.recv().await.unwrap(),
        ":localhost 472 alice +o :Unknown MODE flag"
    );

    // User-mode stub against the own username.
    alice.send_raw("MODE alice").await.unwrap();
    assert_eq!(alice.recv().await.unwrap(), "221 alice +");
    alice.send_raw("MODE alice +i").await.unwrap();
    assert_eq!(
        alice.recv().await.unwrap(),
        ":localhost 501 alice :Unknown MODE flag"
    );
}

#[tokio::test]
async fn test_list_and_lusers() {
    let server = TestServer::spawn(21205).await.expect("spawn server");
    let mut alice = server.connect("alice").await.unwrap();
    alice.register().await.unwrap();
    alice.send_raw("JOIN #beta,#alpha").await.unwrap();
    alice.recv_until(|l| l.contains(" 366 #beta") || l.contains(" 366 alice #beta")).await.unwrap();
    alice.drain().await;

    alice.send_raw("LIST").await.unwrap();
    let lines = alice.recv_until(|l| l.contains(" 323 ")).await.unwrap();
    assert_eq!(lines[0], ":localhost 322 alice #alpha 1 :");
    assert_eq!(lines[1], ":localhost 322 alice #beta 1 :");
    assert_eq!(lines[2], ":localhost 323 alice :End of /LIST");

    alice.send_raw("LUSERS").await.unwrap();
    assert_eq!(
        alice.recv().await.unwrap(),
        ":localhost 251 alice :There are 1 users and 0 invisible on 1 servers"
    );

    alice.send_raw("BOGUS stuff").await.unwrap();
    assert_eq!(
        alice.recv().await.unwrap(),
        ":localhost 421 alice BOGUS :Unknown command"
    );
}
