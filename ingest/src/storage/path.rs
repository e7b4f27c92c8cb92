//! Path layout strategies for flushed storage partitions, per `spec.md`
//! §4.10/§6.

use std::path::PathBuf;

use chrono::{DateTime, Datelike, Utc};
use ingest_types::{AssetKind, Compression, EventKind, PathLayout};

/// Identifies one partition's flushed file, before the codec extension.
#[derive(Debug, Clone)]
pub struct PartitionKey {
    /// Provider key that produced the events in this partition.
    pub source: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Event kind; distinct kinds never share a file.
    pub kind: EventKind,
    /// Asset class, when known; used only by [`PathLayout::ByAssetClass`]/`Canonical`.
    pub asset_kind: Option<AssetKind>,
    /// Representative timestamp for date-partitioned layouts (the first
    /// event's timestamp in the buffer being flushed).
    pub date: DateTime<Utc>,
}

fn sanitize(part: &str) -> String {
    part.chars().map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' }).collect()
}

/// File extension for `compression`, appended after the base schema extension.
#[must_use]
pub const fn codec_extension(compression: Compression) -> &'static str {
    match compression {
        Compression::None => "",
        Compression::Snappy => ".snappy",
        Compression::Gzip => ".gz",
        Compression::Zstd => ".zst",
        Compression::Lz4 => ".lz4",
        Compression::Brotli => ".br",
    }
}

/// Compute the full file path for `key` under `root`, following `layout`,
/// with `compression`'s extension appended.
#[must_use]
pub fn partition_path(root: &std::path::Path, layout: PathLayout, key: &PartitionKey, compression: Compression) -> PathBuf {
    let symbol = sanitize(&key.symbol);
    let source = sanitize(&key.source);
    let kind = key.kind.as_str();
    let asset = key.asset_kind.map_or("unknown", asset_kind_str);
    let base_name = format!("{symbol}.{kind}.parquet{}", codec_extension(compression));

    let dir = match layout {
        PathLayout::Flat => PathBuf::new(),
        PathLayout::BySymbol => PathBuf::from(&symbol),
        PathLayout::ByDate => PathBuf::from(date_path(key.date)),
        PathLayout::ByType => PathBuf::from(kind),
        PathLayout::BySource => PathBuf::from(&source),
        PathLayout::ByAssetClass => PathBuf::from(asset),
        PathLayout::Hierarchical => PathBuf::from(&symbol).join(kind).join(date_path(key.date)),
        PathLayout::Canonical => PathBuf::from(date_path(key.date)).join(&source).join(&symbol).join(kind),
    };
    root.join(dir).join(base_name)
}

fn date_path(ts: DateTime<Utc>) -> PathBuf {
    PathBuf::from(format!("{:04}", ts.year())).join(format!("{:02}", ts.month())).join(format!("{:02}", ts.day()))
}

const fn asset_kind_str(kind: AssetKind) -> &'static str {
    match kind {
        AssetKind::Equity => "equity",
        AssetKind::Crypto => "crypto",
        AssetKind::Forex => "forex",
        AssetKind::Future => "future",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> PartitionKey {
        PartitionKey {
            source: "alpaca".into(),
            symbol: "AAPL".into(),
            kind: EventKind::Trade,
            asset_kind: Some(AssetKind::Equity),
            date: "2026-03-05T00:00:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn distinct_kinds_never_share_a_file() {
        let root = std::path::Path::new("/data");
        let mut a = key();
        a.kind = EventKind::Trade;
        let mut b = key();
        b.kind = EventKind::Quote;
        assert_ne!(
            partition_path(root, PathLayout::Flat, &a, Compression::None),
            partition_path(root, PathLayout::Flat, &b, Compression::None)
        );
    }

    #[test]
    fn canonical_layout_matches_spec_template() {
        let root = std::path::Path::new("/data");
        let path = partition_path(root, PathLayout::Canonical, &key(), Compression::Zstd);
        assert_eq!(path, root.join("2026/03/05/alpaca/AAPL/trade.parquet.zst"));
    }

    #[test]
    fn sanitizes_path_hostile_symbol_characters() {
        let root = std::path::Path::new("/data");
        let mut k = key();
        k.symbol = "EUR/USD".into();
        let path = partition_path(root, PathLayout::BySymbol, &k, Compression::None);
        assert!(path.to_string_lossy().contains("EUR_USD"));
    }
}
