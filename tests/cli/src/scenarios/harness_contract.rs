//! Guarantees the harness itself makes to every test.

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use ipfs_harness::{Cluster, Harness, HarnessError, NodeConfig};

    // ========================================================================
    // Isolation and cleanup (no binary needed)
    // ========================================================================

    #[tokio::test]
    async fn concurrent_harnesses_share_nothing() {
        let a = Harness::new().unwrap();
        let b = Harness::new().unwrap();
        let nodes: Vec<_> = a
            .new_nodes(3)
            .unwrap()
            .into_iter()
            .chain(b.new_nodes(3).unwrap())
            .collect();

        assert!(!a.dir().starts_with(b.dir()) && !b.dir().starts_with(a.dir()));
        let dirs: HashSet<_> = nodes.iter().map(|n| n.dir().to_path_buf()).collect();
        let ports: HashSet<_> = nodes.iter().map(|n| n.swarm_addr().to_string()).collect();
        assert_eq!(dirs.len(), 6);
        assert_eq!(ports.len(), 6);
    }

    #[tokio::test]
    async fn temp_root_removed_after_panic() {
        let (tx, rx) = std::sync::mpsc::channel();
        let outcome = tokio::spawn(async move {
            let h = Harness::new().unwrap();
            h.write_to_temp("scratch").await.unwrap();
            tx.send(h.dir().to_path_buf()).unwrap();
            panic!("test body failed");
        })
        .await;

        assert!(outcome.unwrap_err().is_panic());
        let root = rx.recv().unwrap();
        assert!(!root.exists(), "{} still exists", root.display());
    }

    #[tokio::test]
    async fn cleanup_failure_does_not_escape() {
        let ran = Arc::new(AtomicUsize::new(0));
        {
            let h = Harness::new().unwrap();
            let r = ran.clone();
            h.register_cleanup(move || {
                r.fetch_add(1, Ordering::SeqCst);
                Err(HarnessError::Network("already gone".into()))
            });
        }
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    // ========================================================================
    // Against the real binary
    // ========================================================================

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires ipfs binary"]
    async fn daemons_are_reaped_at_teardown() {
        let h = Harness::new().unwrap();
        let nodes = h.new_nodes(2).unwrap();
        nodes.init(&[]).await.unwrap().start_daemons(&[]).await.unwrap();

        let mut pids = Vec::new();
        for node in &nodes {
            pids.push(node.daemon_pid().await.unwrap());
        }
        drop(h);

        for pid in pids {
            // Signal 0 fails with ESRCH once the process is reaped.
            assert_ne!(unsafe { libc::kill(pid as libc::pid_t, 0) }, 0, "pid {pid} survived");
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires ipfs binary"]
    async fn config_round_trip() {
        let h = Harness::new().unwrap();
        let node = h.new_node().unwrap();
        node.init(&[]).await.unwrap();

        let mutate = |cfg: &mut NodeConfig| {
            cfg.set("Import.CidVersion", 1)?;
            cfg.set("Gateway.NoFetch", true)?;
            cfg.push("Peering.Peers", serde_json::json!({ "ID": "QmQCU2EcMqAqQPR2i9bChDtGNJchTbq5TbXJJ16u19uLTa", "Addrs": [] }))
        };

        let mut expected = node.read_config().await.unwrap();
        mutate(&mut expected).unwrap();
        node.update_config(mutate).await.unwrap();
        assert_eq!(node.read_config().await.unwrap().value(), expected.value());

        // The daemon's own reader agrees with the in-place edit.
        assert_eq!(node.get_ipfs_config("Import.CidVersion").await.unwrap(), serde_json::json!(1));
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires ipfs binary"]
    async fn cluster_forms_a_mesh() {
        let cluster = Cluster::start(3).await.unwrap();
        cluster.nodes().connect().await.unwrap();
        for node in cluster.nodes() {
            assert_eq!(node.peer_ids().await.unwrap().len(), 2, "node {}", node.id());
        }
        cluster.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires ipfs binary"]
    async fn fan_out_restarts_every_node() {
        let h = Harness::new().unwrap();
        let nodes = h.new_nodes(3).unwrap();
        nodes.init(&[]).await.unwrap().start_daemons(&[]).await.unwrap();

        let restarted = Arc::new(AtomicUsize::new(0));
        let r = restarted.clone();
        nodes
            .for_each_par(move |node| {
                let r = r.clone();
                async move {
                    node.stop_daemon().await?.start_daemon(&[]).await?;
                    r.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await
            .unwrap();
        assert_eq!(restarted.load(Ordering::SeqCst), 3);

        h.eventually("all daemons alive", Duration::from_secs(5), || {
            let nodes = nodes.clone();
            async move {
                for node in &nodes {
                    if !node.is_alive().await {
                        return false;
                    }
                }
                true
            }
        })
        .await
        .unwrap();
    }
}
