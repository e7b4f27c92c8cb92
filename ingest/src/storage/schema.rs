//! Typed parquet schemas per event kind, per `spec.md` §4.10: "one row group
//! with typed columns (timestamp, symbol, price, size, side, sequence,
//! venue, source for Trade; analogous schemas for Quote, L2, Bar, and a
//! generic JSON-payload schema for other types)".

use std::io::Write;
use std::sync::Arc;

use ingest_types::{EventKind, MarketEvent};
use parquet::column::writer::ColumnWriter;
use parquet::data_type::ByteArray;
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::parser::parse_message_type;

const TRADE_SCHEMA: &str = "
message trade {
    REQUIRED INT64 timestamp (TIMESTAMP_MILLIS);
    REQUIRED BYTE_ARRAY symbol (UTF8);
    REQUIRED DOUBLE price;
    REQUIRED DOUBLE size;
    OPTIONAL BYTE_ARRAY side (UTF8);
    REQUIRED INT64 sequence;
    OPTIONAL BYTE_ARRAY venue (UTF8);
    REQUIRED BYTE_ARRAY source (UTF8);
}
";

const QUOTE_SCHEMA: &str = "
message quote {
    REQUIRED INT64 timestamp (TIMESTAMP_MILLIS);
    REQUIRED BYTE_ARRAY symbol (UTF8);
    REQUIRED DOUBLE bid_price;
    REQUIRED DOUBLE bid_size;
    REQUIRED DOUBLE ask_price;
    REQUIRED DOUBLE ask_size;
    REQUIRED INT64 sequence;
    REQUIRED BYTE_ARRAY source (UTF8);
}
";

const BAR_SCHEMA: &str = "
message bar {
    REQUIRED INT64 timestamp (TIMESTAMP_MILLIS);
    REQUIRED BYTE_ARRAY symbol (UTF8);
    REQUIRED DOUBLE open;
    REQUIRED DOUBLE high;
    REQUIRED DOUBLE low;
    REQUIRED DOUBLE close;
    REQUIRED DOUBLE volume;
    REQUIRED INT64 sequence;
    REQUIRED BYTE_ARRAY source (UTF8);
}
";

const GENERIC_SCHEMA: &str = "
message generic_event {
    REQUIRED INT64 timestamp (TIMESTAMP_MILLIS);
    REQUIRED BYTE_ARRAY symbol (UTF8);
    REQUIRED BYTE_ARRAY kind (UTF8);
    REQUIRED INT64 sequence;
    REQUIRED BYTE_ARRAY source (UTF8);
    REQUIRED BYTE_ARRAY payload (UTF8);
}
";

/// Parquet message-type schema string for `kind`. `OrderBook` reuses the
/// generic JSON schema: L2 deltas vary too much in shape across providers to
/// give them fixed numeric columns.
#[must_use]
pub fn schema_for(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Trade => TRADE_SCHEMA,
        EventKind::Quote => QUOTE_SCHEMA,
        EventKind::Candle => BAR_SCHEMA,
        EventKind::OrderBook | EventKind::Gap => GENERIC_SCHEMA,
    }
}

fn f64_field(event: &MarketEvent, key: &str) -> f64 {
    event.payload.get(key).and_then(serde_json::Value::as_f64).unwrap_or(0.0)
}

fn str_field(event: &MarketEvent, key: &str) -> Option<String> {
    event.payload.get(key).and_then(serde_json::Value::as_str).map(str::to_string)
}

fn byte_array(s: &str) -> ByteArray {
    ByteArray::from(s.as_bytes().to_vec())
}

/// Write one row group containing `events` (already filtered to a single
/// `EventKind`) to `writer`.
///
/// # Errors
/// Returns a [`ParquetError`] on any column-writer or row-group failure.
pub fn write_row_group<W: Write + Send>(
    writer: &mut SerializedFileWriter<W>,
    kind: EventKind,
    events: &[MarketEvent],
) -> Result<(), ParquetError> {
    let mut row_group_writer = writer.next_row_group()?;

    let timestamps: Vec<i64> = events.iter().map(|e| e.timestamp.timestamp_millis()).collect();
    let symbols: Vec<ByteArray> = events.iter().map(|e| byte_array(&e.symbol)).collect();
    let sequences: Vec<i64> = events.iter().map(|e| e.sequence as i64).collect();
    let sources: Vec<ByteArray> = events.iter().map(|e| byte_array(&e.source)).collect();

    write_required_i64(&mut row_group_writer, &timestamps)?;
    write_required_bytes(&mut row_group_writer, &symbols)?;

    match kind {
        EventKind::Trade => {
            let prices: Vec<f64> = events.iter().map(|e| f64_field(e, "price")).collect();
            let sizes: Vec<f64> = events.iter().map(|e| f64_field(e, "size")).collect();
            let sides: Vec<Option<ByteArray>> = events.iter().map(|e| str_field(e, "side").map(|s| byte_array(&s))).collect();
            let venues: Vec<Option<ByteArray>> = events.iter().map(|e| str_field(e, "venue").map(|s| byte_array(&s))).collect();
            write_required_f64(&mut row_group_writer, &prices)?;
            write_required_f64(&mut row_group_writer, &sizes)?;
            write_optional_bytes(&mut row_group_writer, &sides)?;
            write_required_i64(&mut row_group_writer, &sequences)?;
            write_optional_bytes(&mut row_group_writer, &venues)?;
            write_required_bytes(&mut row_group_writer, &sources)?;
        }
        EventKind::Quote => {
            let bid_price: Vec<f64> = events.iter().map(|e| f64_field(e, "bidPrice")).collect();
            let bid_size: Vec<f64> = events.iter().map(|e| f64_field(e, "bidSize")).collect();
            let ask_price: Vec<f64> = events.iter().map(|e| f64_field(e, "askPrice")).collect();
            let ask_size: Vec<f64> = events.iter().map(|e| f64_field(e, "askSize")).collect();
            write_required_f64(&mut row_group_writer, &bid_price)?;
            write_required_f64(&mut row_group_writer, &bid_size)?;
            write_required_f64(&mut row_group_writer, &ask_price)?;
            write_required_f64(&mut row_group_writer, &ask_size)?;
            write_required_i64(&mut row_group_writer, &sequences)?;
            write_required_bytes(&mut row_group_writer, &sources)?;
        }
        EventKind::Candle => {
            let open: Vec<f64> = events.iter().map(|e| f64_field(e, "open")).collect();
            let high: Vec<f64> = events.iter().map(|e| f64_field(e, "high")).collect();
            let low: Vec<f64> = events.iter().map(|e| f64_field(e, "low")).collect();
            let close: Vec<f64> = events.iter().map(|e| f64_field(e, "close")).collect();
            let volume: Vec<f64> = events.iter().map(|e| f64_field(e, "volume")).collect();
            write_required_f64(&mut row_group_writer, &open)?;
            write_required_f64(&mut row_group_writer, &high)?;
            write_required_f64(&mut row_group_writer, &low)?;
            write_required_f64(&mut row_group_writer, &close)?;
            write_required_f64(&mut row_group_writer, &volume)?;
            write_required_i64(&mut row_group_writer, &sequences)?;
            write_required_bytes(&mut row_group_writer, &sources)?;
        }
        EventKind::OrderBook | EventKind::Gap => {
            let kinds: Vec<ByteArray> = events.iter().map(|e| byte_array(e.kind.as_str())).collect();
            let payloads: Vec<ByteArray> = events.iter().map(|e| byte_array(&e.payload.to_string())).collect();
            write_required_bytes(&mut row_group_writer, &kinds)?;
            write_required_i64(&mut row_group_writer, &sequences)?;
            write_required_bytes(&mut row_group_writer, &sources)?;
            write_required_bytes(&mut row_group_writer, &payloads)?;
        }
    }

    row_group_writer.close()?;
    Ok(())
}

fn write_required_i64<W: Write + Send>(
    row_group_writer: &mut parquet::file::writer::SerializedRowGroupWriter<'_, W>,
    values: &[i64],
) -> Result<(), ParquetError> {
    if let Some(mut col_writer) = row_group_writer.next_column()? {
        if let ColumnWriter::Int64ColumnWriter(ref mut typed) = col_writer.untyped() {
            typed.write_batch(values, None, None)?;
        }
        col_writer.close()?;
    }
    Ok(())
}

fn write_required_f64<W: Write + Send>(
    row_group_writer: &mut parquet::file::writer::SerializedRowGroupWriter<'_, W>,
    values: &[f64],
) -> Result<(), ParquetError> {
    if let Some(mut col_writer) = row_group_writer.next_column()? {
        if let ColumnWriter::DoubleColumnWriter(ref mut typed) = col_writer.untyped() {
            typed.write_batch(values, None, None)?;
        }
        col_writer.close()?;
    }
    Ok(())
}

fn write_required_bytes<W: Write + Send>(
    row_group_writer: &mut parquet::file::writer::SerializedRowGroupWriter<'_, W>,
    values: &[ByteArray],
) -> Result<(), ParquetError> {
    if let Some(mut col_writer) = row_group_writer.next_column()? {
        if let ColumnWriter::ByteArrayColumnWriter(ref mut typed) = col_writer.untyped() {
            typed.write_batch(values, None, None)?;
        }
        col_writer.close()?;
    }
    Ok(())
}

fn write_optional_bytes<W: Write + Send>(
    row_group_writer: &mut parquet::file::writer::SerializedRowGroupWriter<'_, W>,
    values: &[Option<ByteArray>],
) -> Result<(), ParquetError> {
    if let Some(mut col_writer) = row_group_writer.next_column()? {
        if let ColumnWriter::ByteArrayColumnWriter(ref mut typed) = col_writer.untyped() {
            let def_levels: Vec<i16> = values.iter().map(|v| i16::from(v.is_some())).collect();
            let present: Vec<ByteArray> = values.iter().filter_map(Clone::clone).collect();
            typed.write_batch(&present, Some(&def_levels), None)?;
        }
        col_writer.close()?;
    }
    Ok(())
}

/// Parse `schema_for(kind)` and build a fresh [`SerializedFileWriter`] over
/// `sink`.
///
/// # Errors
/// Returns a [`ParquetError`] if the schema string fails to parse or the
/// writer fails to initialize.
pub fn new_writer<W: Write + Send>(sink: W, kind: EventKind) -> Result<SerializedFileWriter<W>, ParquetError> {
    let schema = Arc::new(parse_message_type(schema_for(kind))?);
    let props = Arc::new(WriterProperties::builder().build());
    SerializedFileWriter::new(sink, schema, props)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_schema_parses() {
        assert!(parse_message_type(TRADE_SCHEMA).is_ok());
    }

    #[test]
    fn quote_schema_parses() {
        assert!(parse_message_type(QUOTE_SCHEMA).is_ok());
    }

    #[test]
    fn bar_schema_parses() {
        assert!(parse_message_type(BAR_SCHEMA).is_ok());
    }

    #[test]
    fn generic_schema_parses() {
        assert!(parse_message_type(GENERIC_SCHEMA).is_ok());
    }
}
