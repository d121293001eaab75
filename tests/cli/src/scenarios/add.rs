//! Content addressing through `ipfs add`.

#[cfg(test)]
mod tests {
    use crate::fixtures::{HELLO_WORLD, HELLO_WORLD_CID_V0, HELLO_WORLD_CID_V1};
    use ipfs_harness::Harness;

    #[tokio::test]
    #[ignore = "requires ipfs binary"]
    async fn add_hello_world_default_cid() {
        let h = Harness::new().unwrap();
        let node = h.new_node().unwrap();
        node.init(&[]).await.unwrap();

        let cid = node.ipfs_add_str(HELLO_WORLD, &[]).await.unwrap();
        assert_eq!(cid, HELLO_WORLD_CID_V0);
    }

    #[tokio::test]
    #[ignore = "requires ipfs binary"]
    async fn cid_version_from_config_and_flag_override() {
        let h = Harness::new().unwrap();
        let node = h.new_node().unwrap();
        node.init(&[])
            .await
            .unwrap()
            .update_config(|cfg| cfg.set("Import.CidVersion", 1))
            .await
            .unwrap();

        let cid = node.ipfs_add_str(HELLO_WORLD, &[]).await.unwrap();
        assert_eq!(cid, HELLO_WORLD_CID_V1);

        let cid = node
            .ipfs_add_str(HELLO_WORLD, &["--cid-version", "0"])
            .await
            .unwrap();
        assert_eq!(cid, HELLO_WORLD_CID_V0);
    }

    #[tokio::test]
    #[ignore = "requires ipfs binary"]
    async fn add_through_running_daemon() {
        let h = Harness::new().unwrap();
        let node = h.new_node().unwrap();
        node.init(&[]).await.unwrap().start_daemon(&[]).await.unwrap();

        let cid = node.ipfs_add_str(HELLO_WORLD, &[]).await.unwrap();
        assert_eq!(cid, HELLO_WORLD_CID_V0);

        let res = node.api_client().await.unwrap().api_post("cat", &[("arg", &cid)]).await.unwrap();
        assert_eq!(res.status, 200);
        assert_eq!(res.body, HELLO_WORLD);
    }
}
