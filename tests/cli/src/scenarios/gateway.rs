//! Gateway responses.

#[cfg(test)]
mod tests {
    use crate::fixtures::RangeFixture;
    use ipfs_harness::assertions::assert_status;
    use ipfs_harness::{with_header, Harness};

    #[tokio::test]
    #[ignore = "requires ipfs binary"]
    async fn webui_unavailable_without_fetch() {
        let h = Harness::new().unwrap();
        let node = h.new_node().unwrap();
        node.init(&[])
            .await
            .unwrap()
            .update_config(|cfg| cfg.set("Gateway.NoFetch", true))
            .await
            .unwrap()
            .start_daemon(&[])
            .await
            .unwrap();

        let res = node.gateway_client().await.unwrap().get("/webui/").await.unwrap();
        assert_status(&res, 503).into_result().unwrap();
        assert!(res.body.contains("IPFS WebUI Not Available"), "{}", res.body);
    }

    #[tokio::test]
    #[ignore = "requires ipfs binary"]
    async fn byte_range_from_imported_car() {
        let fixture = RangeFixture::from_env().unwrap_or_else(|e| panic!("{e}"));

        let h = Harness::new().unwrap();
        let node = h.new_node().unwrap();
        node.init(&[]).await.unwrap().start_daemon(&["--offline"]).await.unwrap();

        let car = tokio::fs::File::open(&fixture.car).await.unwrap();
        node.ipfs_dag_import(car, &fixture.root_cid, &[]).await.unwrap();

        let res = node
            .gateway_client()
            .await
            .unwrap()
            .get_with(
                &format!("/ipfs/{}", fixture.file_cid),
                vec![with_header("Range", RangeFixture::RANGE)],
            )
            .await
            .unwrap();
        assert_status(&res, 206).into_result().unwrap();
        assert_eq!(res.header("Content-Range"), Some(RangeFixture::CONTENT_RANGE));
        assert_eq!(res.body, RangeFixture::BODY);
    }

    #[tokio::test]
    #[ignore = "requires ipfs binary"]
    async fn templated_gateway_path() {
        let h = Harness::new().unwrap();
        let node = h.new_node().unwrap();
        node.init(&[]).await.unwrap().start_daemon(&[]).await.unwrap();
        let cid = node.ipfs_add_str("templated", &[]).await.unwrap();

        let client = node.gateway_client().await.unwrap().with_template("CID", cid);
        let res = client.get("/ipfs/{{.CID}}").await.unwrap();
        assert_status(&res, 200).into_result().unwrap();
        assert_eq!(res.body, "templated");
    }
}
