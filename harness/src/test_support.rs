//! Fake daemon binary and helpers for unit tests that cannot run the real one.
//!
//! The fake is a POSIX shell script. It keeps its state in plain files under
//! `$IPFS_PATH/.fake/` and understands just enough of the CLI to drive the
//! harness: `init`, `config`, `daemon`, `add`, `swarm`, `dag`, `block`,
//! `commands`, `version`. Writing `.fake/swarm-addrs` overrides what
//! `swarm addrs` reports. The daemon does not speak HTTP; it writes the
//! addresses given in `FAKE_API_ADDR` / `FAKE_GATEWAY_URL` to its readiness
//! files, and tests serve those endpoints themselves.

use std::path::{Path, PathBuf};

use axum::routing::post;
use axum::{Json, Router};
use tempfile::TempDir;

use crate::config::HarnessConfig;
use crate::harness::Harness;

/// Peer identities handed out by node directory name (`0`, `1`, ...).
pub(crate) const FAKE_PEER_IDS: [&str; 4] = [
    "QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN",
    "QmQCU2EcMqAqQPR2i9bChDtGNJchTbq5TbXJJ16u19uLTa",
    "QmbLHAnMoJPWSCR5Zhtx6BHJX9KiKNN6tpvbUcqanj75Nb",
    "QmcgpsyWgH8Y8ajJz1Cu72KnS5uo2Aa2LpzU7kinSupNKC",
];

const FAKE_IPFS: &str = r#"#!/bin/sh
root="${IPFS_PATH:?IPFS_PATH not set}"
state="$root/.fake"

peer_for() {
  case "$1" in
    0) echo "QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN" ;;
    1) echo "QmQCU2EcMqAqQPR2i9bChDtGNJchTbq5TbXJJ16u19uLTa" ;;
    2) echo "QmbLHAnMoJPWSCR5Zhtx6BHJX9KiKNN6tpvbUcqanj75Nb" ;;
    3) echo "QmcgpsyWgH8Y8ajJz1Cu72KnS5uo2Aa2LpzU7kinSupNKC" ;;
    *) echo "QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN" ;;
  esac
}

self_id() { peer_for "$(basename "$root")"; }

swarm_addr() {
  grep -o '/ip4/127.0.0.1/tcp/[1-9][0-9]*' "$root/config" | head -n 1
}

dir_of_peer() {
  for cfg in "$(dirname "$root")"/*/config; do
    if grep -q "\"PeerID\": \"$1\"" "$cfg" 2>/dev/null; then dirname "$cfg"; return 0; fi
  done
  return 1
}

cmd="$1"
[ $# -gt 0 ] && shift

case "$cmd" in
  version)
    echo "ipfs version 0.0.0-fake"
    ;;
  commands)
    printf 'ipfs\nipfs add\nipfs config\nipfs daemon\nipfs init\n'
    ;;
  init)
    for arg in "$@"; do
      case "$arg" in
        --profile=bogus|bogus) echo "Error: invalid configuration profile: bogus" >&2; exit 1 ;;
      esac
    done
    if [ -f "$root/config" ]; then
      echo "Error: ipfs configuration file already exists!" >&2
      exit 1
    fi
    mkdir -p "$root" "$state" || exit 1
    id="$(self_id)"
    cat > "$root/config" <<EOF
{
  "Identity": { "PeerID": "$id" },
  "Addresses": {
    "Swarm": ["/ip4/0.0.0.0/tcp/4001"],
    "API": "/ip4/127.0.0.1/tcp/5001",
    "Gateway": "/ip4/127.0.0.1/tcp/8080"
  },
  "Bootstrap": ["/dnsaddr/bootstrap.libp2p.io/p2p/QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN"],
  "Peering": { "Peers": null }
}
EOF
    echo "peer identity: $id"
    ;;
  config)
    if [ "$1" = "--json" ]; then
      shift
      printf '%s' "$2" > "$state/config.$1"
    elif [ -n "$2" ]; then
      printf '%s' "$2" > "$state/config.$1"
    elif [ "$1" = "Identity.PeerID" ]; then
      self_id
    elif [ -f "$state/config.$1" ]; then
      cat "$state/config.$1"; echo
    else
      echo "Error: failed to get config value: key has no attributes" >&2
      exit 1
    fi
    ;;
  daemon)
    if [ -n "$FAKE_DAEMON_FAIL" ]; then
      echo "Error: $FAKE_DAEMON_FAIL" >&2
      exit 1
    fi
    echo "$*" > "$state/daemon-args"
    trap 'rm -f "$root/api" "$root/gateway"; echo "Received interrupt signal, shutting down..."; exit 0' TERM INT
    [ -n "$FAKE_API_ADDR" ] && printf '%s' "$FAKE_API_ADDR" > "$root/api"
    [ -n "$FAKE_GATEWAY_URL" ] && printf '%s' "$FAKE_GATEWAY_URL" > "$root/gateway"
    echo "Daemon is ready"
    while true; do sleep 0.05; done
    ;;
  add)
    cksum | cut -d ' ' -f 1 | sed 's/^/fake-cid-/'
    ;;
  swarm)
    sub="$1"; [ $# -gt 0 ] && shift
    case "$sub" in
      addrs)
        if [ -f "$state/swarm-addrs" ]; then cat "$state/swarm-addrs"; else swarm_addr; fi
        ;;
      peers) [ -f "$state/peers" ] && cat "$state/peers"; true ;;
      connect)
        target="$1"
        other_id="${target##*/}"
        other_dir="$(dir_of_peer "$other_id")" || { echo "Error: connect $other_id failure: no route" >&2; exit 1; }
        grep -q "$other_id" "$state/peers" 2>/dev/null || echo "$target" >> "$state/peers"
        me="$(swarm_addr)/p2p/$(self_id)"
        grep -q "$(self_id)" "$other_dir/.fake/peers" 2>/dev/null || echo "$me" >> "$other_dir/.fake/peers"
        echo "connect $other_id success"
        ;;
      disconnect)
        other_id="${1##*/}"
        if [ -f "$state/peers" ]; then
          grep -v "$other_id" "$state/peers" > "$state/peers.tmp"; mv "$state/peers.tmp" "$state/peers"
        fi
        other_dir="$(dir_of_peer "$other_id")" && [ -f "$other_dir/.fake/peers" ] && {
          grep -v "$(self_id)" "$other_dir/.fake/peers" > "$other_dir/.fake/peers.tmp"
          mv "$other_dir/.fake/peers.tmp" "$other_dir/.fake/peers"
        }
        echo "disconnect $other_id success"
        ;;
      *) echo "Error: unknown swarm command $sub" >&2; exit 1 ;;
    esac
    ;;
  dag)
    sub="$1"; [ $# -gt 0 ] && shift
    case "$sub" in
      import) echo "$*" > "$state/dag-import-args"; head -n 1 >> "$state/blocks"; cat > /dev/null ;;
      export) echo "car:$1" ;;
      *) exit 1 ;;
    esac
    ;;
  block)
    last=""
    for arg in "$@"; do last="$arg"; done
    grep -qx "$last" "$state/blocks" 2>/dev/null || { echo "Error: block $last not found locally" >&2; exit 1; }
    echo "Key: $last"
    ;;
  *)
    echo "Error: unknown command '$cmd'" >&2
    exit 1
    ;;
esac
"#;

/// A harness wired to the fake binary. Field order keeps the binary around
/// until the harness (and its daemons) are gone.
pub(crate) struct FakeEnv {
    pub harness: Harness,
    _bin_dir: TempDir,
}

impl std::ops::Deref for FakeEnv {
    type Target = Harness;

    fn deref(&self) -> &Harness {
        &self.harness
    }
}

/// Write the fake binary into `dir` and return its path.
pub(crate) fn write_fake_ipfs(dir: &Path) -> PathBuf {
    let path = dir.join("ipfs");
    std::fs::write(&path, FAKE_IPFS).expect("write fake ipfs");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod fake ipfs");
    }
    path
}

/// Harness running the fake binary with a short startup timeout.
pub(crate) fn fake_env() -> FakeEnv {
    let bin_dir = tempfile::tempdir().expect("tempdir");
    let bin = write_fake_ipfs(bin_dir.path());
    let config = HarnessConfig::default()
        .with_bin(bin)
        .with_startup_timeout(std::time::Duration::from_secs(5));
    FakeEnv {
        harness: Harness::with_config(config).expect("harness"),
        _bin_dir: bin_dir,
    }
}

/// Serve `POST /api/v0/id` answering with `peer_id`; returns the TCP multiaddr.
///
/// When `required_auth` is set, requests without that exact `Authorization`
/// header get 401.
pub(crate) async fn serve_id(peer_id: &str, required_auth: Option<&str>) -> String {
    let peer_id = peer_id.to_string();
    let required_auth = required_auth.map(str::to_string);
    let app = Router::new().route(
        "/api/v0/id",
        post(move |headers: axum::http::HeaderMap| {
            let peer_id = peer_id.clone();
            let required_auth = required_auth.clone();
            async move {
                let given = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                if required_auth.is_some() && given != required_auth {
                    return Err(axum::http::StatusCode::UNAUTHORIZED);
                }
                Ok(Json(serde_json::json!({ "ID": peer_id, "Addresses": [] })))
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind id server");
    let port = listener.local_addr().expect("local addr").port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("/ip4/127.0.0.1/tcp/{port}")
}
