//! Shared fixtures: an in-memory bucket holding a Japanese dataset and a
//! server bound to an ephemeral port.

#![allow(dead_code)]

use std::{net::SocketAddr, path::Path, sync::Arc};

use rusqlite::{Connection, params};
use tempfile::TempDir;
use tokio::net::TcpListener;
use travelplaces::{
    config::Config,
    routes::{AppState, router},
    storage::MemoryObjectStore,
};

pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfixture";

pub struct Row {
    pub id: i64,
    pub name: &'static str,
    pub region: &'static str,
    pub county: &'static str,
    pub total_reviews: i64,
    pub rating: &'static str,
    pub positive_reviews: i64,
    pub images: [bool; 3],
}

#[allow(clippy::too_many_arguments)]
const fn row(
    id: i64,
    name: &'static str,
    region: &'static str,
    county: &'static str,
    total_reviews: i64,
    rating: &'static str,
    positive_reviews: i64,
    images: [bool; 3],
) -> Row {
    Row {
        id,
        name,
        region,
        county,
        total_reviews,
        rating,
        positive_reviews,
        images,
    }
}

pub fn rows() -> Vec<Row> {
    vec![
        row(1, "Kinkaku-ji", "Kansai", "Kyoto", 900, "100%", 880, [true, true, false]),
        row(2, "Fushimi Inari", "Kansai", "Kyoto", 1200, "90%", 1000, [true, false, false]),
        row(3, "Osaka Castle", "Kansai", "Osaka", 400, "100%", 390, [false, false, false]),
        row(4, "Tokyo Tower", "Kanto", "Tokyo", 50, "50%", 20, [false, false, false]),
        row(5, "Senso-ji", "Kanto", "Tokyo", 700, "75%", 500, [false, false, true]),
    ]
}

/// Serialize a dataset with the standard `attractions` schema to bytes.
pub fn dataset_bytes(dir: &Path, rows: &[Row]) -> Vec<u8> {
    let path = dir.join("fixture-source.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE attractions (
            id INTEGER PRIMARY KEY,
            name TEXT,
            region TEXT,
            county TEXT,
            overview TEXT,
            duration TEXT,
            details TEXT,
            position TEXT,
            total_reviews INTEGER,
            rating TEXT,
            positive_reviews INTEGER,
            website TEXT,
            image1 INTEGER,
            image2 INTEGER,
            image3 INTEGER
        );",
    )
    .unwrap();

    for row in rows {
        conn.execute(
            "INSERT INTO attractions (id, name, region, county, overview, duration, details, \
             position, total_reviews, rating, positive_reviews, website, image1, image2, image3) \
             VALUES (?1, ?2, ?3, ?4, 'A landmark.', '1-2 hours', 'Open daily.', '35.0,135.7', \
             ?5, ?6, ?7, 'https://example.jp', ?8, ?9, ?10)",
            params![
                row.id,
                row.name,
                row.region,
                row.county,
                row.total_reviews,
                row.rating,
                row.positive_reviews,
                row.images[0],
                row.images[1],
                row.images[2],
            ],
        )
        .unwrap();
    }
    conn.close().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    bytes
}

pub struct TestServer {
    pub base_url: String,
    pub store: Arc<MemoryObjectStore>,
    pub dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn snapshot_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("snapshots")
    }

    pub fn leftover_snapshots(&self) -> usize {
        std::fs::read_dir(self.snapshot_dir()).map_or(0, Iterator::count)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }
}

/// Start a server over a bucket holding `jp.db` and the images its rows flag.
pub async fn spawn(configure: impl FnOnce(&mut Config)) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryObjectStore::new());

    let rows = rows();
    store.insert("jp.db", dataset_bytes(dir.path(), &rows)).await;
    for row in &rows {
        for (slot, present) in row.images.iter().enumerate() {
            if *present {
                store
                    .insert(format!("jp-{}-image{}.png", row.id, slot + 1), PNG_BYTES.to_vec())
                    .await;
            }
        }
    }
    // Flagged in the dataset but missing from the bucket.
    store.remove("jp-2-image1.png").await;

    let mut config = Config {
        data_dir: dir.path().join("snapshots"),
        users_db: dir.path().join("users.db"),
        ..Config::default()
    };
    configure(&mut config);

    let state = AppState::new(config, store.clone()).unwrap();
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{address}"),
        store,
        dir,
        client: reqwest::Client::new(),
    }
}
