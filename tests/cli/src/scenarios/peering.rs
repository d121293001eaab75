//! Static peering and swarm control between nodes.

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::time::Duration;

    use ipfs_harness::assertions::assert_peers_contain;
    use ipfs_harness::{create_peer_nodes, Harness, PeeringEdge};

    const CONVERGENCE: Duration = Duration::from_secs(60);

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires ipfs binary"]
    async fn mutual_peering_converges() {
        let h = Harness::new().unwrap();
        let nodes = create_peer_nodes(&h, 2, &PeeringEdge::mutual(0, 1))
            .await
            .unwrap();
        nodes.start_daemons(&[]).await.unwrap();

        for (me, other) in [(0, 1), (1, 0)] {
            let node = &nodes[me];
            let want = nodes[other].peer_id().await.unwrap();
            let want = &want;
            h.eventually(&format!("node {me} sees node {other}"), CONVERGENCE, move || async move {
                node.peer_ids()
                    .await
                    .map(|peers| peers.contains(want))
                    .unwrap_or(false)
            })
            .await
            .unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires ipfs binary"]
    async fn one_sided_peering_reaches_both() {
        let h = Harness::new().unwrap();
        let nodes = create_peer_nodes(&h, 3, &[PeeringEdge::new(0, 1), PeeringEdge::new(0, 2)])
            .await
            .unwrap();
        nodes.start_daemons(&[]).await.unwrap();

        let expected = vec![nodes[1].peer_id().await.unwrap(), nodes[2].peer_id().await.unwrap()];
        let (hub, expected) = (&nodes[0], &expected);
        h.eventually("hub connected to both spokes", CONVERGENCE, move || async move {
            match hub.peer_ids().await {
                Ok(peers) => assert_peers_contain(&peers, expected).passed,
                Err(_) => false,
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires ipfs binary"]
    async fn connect_is_idempotent() {
        let h = Harness::new().unwrap();
        let nodes = h.new_nodes(2).unwrap();
        nodes.init(&[]).await.unwrap().start_daemons(&[]).await.unwrap();
        let (a, b) = (&nodes[0], &nodes[1]);

        a.connect_and_wait(b, CONVERGENCE).await.unwrap();
        let once: BTreeSet<_> = a.peer_ids().await.unwrap().into_iter().collect();

        b.connect(a).await.unwrap();
        let twice: BTreeSet<_> = a.peer_ids().await.unwrap().into_iter().collect();
        assert_eq!(once, twice);
        assert_eq!(once.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires ipfs binary"]
    async fn disconnect_drops_the_peer() {
        let h = Harness::new().unwrap();
        let nodes = h.new_nodes(2).unwrap();
        nodes.init(&[]).await.unwrap().start_daemons(&[]).await.unwrap().connect().await.unwrap();
        let (a, b) = (&nodes[0], &nodes[1]);

        a.disconnect(b).await.unwrap();
        let gone = b.peer_id().await.unwrap();
        let gone = &gone;
        h.eventually("peer dropped", Duration::from_secs(10), move || async move {
            a.peer_ids()
                .await
                .map(|peers| !peers.contains(gone))
                .unwrap_or(false)
        })
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires ipfs binary"]
    async fn swarm_addrs_carry_peer_id() {
        let h = Harness::new().unwrap();
        let node = h.new_node().unwrap();
        node.init(&[]).await.unwrap().start_daemon(&[]).await.unwrap();

        let id = node.peer_id().await.unwrap();
        let addrs = node.swarm_addrs_with_peer_id().await.unwrap();
        assert!(!addrs.is_empty());
        for addr in addrs {
            assert!(addr.to_string().ends_with(&format!("/p2p/{id}")), "{addr}");
        }
    }
}
