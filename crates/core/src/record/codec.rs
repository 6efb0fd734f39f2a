use super::{RecordError, WorkRecord};
use crate::sensor::SceneId;

/// Padding character filling each line up to the block size.
pub const FILLER: char = '#';

/// Shortest block that can hold `{}` plus the newline.
const MIN_BLOCK_SIZE: usize = 3;

/// Encodes work records into fixed-size lines.
#[derive(Debug, Clone, Copy)]
pub struct RecordCodec {
    block_size: usize,
}

impl RecordCodec {
    pub fn new(block_size: usize) -> Result<Self, RecordError> {
        if block_size < MIN_BLOCK_SIZE {
            return Err(RecordError::InvalidBlockSize(block_size));
        }
        Ok(Self { block_size })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Bytes available for the JSON object (block minus the newline).
    pub fn capacity(&self) -> usize {
        self.block_size - 1
    }

    /// Encode a record into exactly `block_size` bytes, newline included.
    ///
    /// A record that does not fit is an error; it is never truncated.
    pub fn encode(&self, record: &WorkRecord) -> Result<String, RecordError> {
        let json =
            serde_json::to_string(record).map_err(|e| RecordError::Serialize(e.to_string()))?;

        let capacity = self.capacity();
        if json.len() > capacity {
            return Err(RecordError::TooLong {
                length: json.len(),
                capacity,
            });
        }

        let mut line = String::with_capacity(self.block_size);
        line.push_str(&json);
        line.extend(std::iter::repeat(FILLER).take(capacity - json.len()));
        line.push('\n');
        Ok(line)
    }

    pub fn decode(&self, line: &str) -> Result<WorkRecord, RecordError> {
        decode(line)
    }
}

/// Decode one record line.
///
/// The filler after the JSON object may be any run of `#` (or be absent);
/// anything else there is rejected. The scene id must match a supported
/// sensor grammar.
pub fn decode(line: &str) -> Result<WorkRecord, RecordError> {
    let line = line.trim_end_matches(['\n', '\r']);

    let mut stream = serde_json::Deserializer::from_str(line).into_iter::<WorkRecord>();
    let record = match stream.next() {
        Some(Ok(record)) => record,
        Some(Err(e)) => return Err(RecordError::Malformed(e.to_string())),
        None => return Err(RecordError::Malformed("empty line".to_string())),
    };

    let rest = &line[stream.byte_offset()..];
    if !rest.chars().all(|c| c == FILLER || c.is_ascii_whitespace()) {
        let preview: String = rest.chars().take(32).collect();
        return Err(RecordError::TrailingData(preview));
    }

    if record.order_id.trim().is_empty() {
        return Err(RecordError::EmptyField("orderid"));
    }
    if record.callback_address.trim().is_empty() {
        return Err(RecordError::EmptyField("callback_address"));
    }
    SceneId::parse(&record.scene)?;

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ProductOptions;

    fn sample_record() -> WorkRecord {
        WorkRecord::new(
            "jdoe-101914-093015",
            "LT50440341996220XXX01",
            ProductOptions::new()
                .with("include_sr", true)
                .with("include_cfmask", false)
                .with("output_format", "gtiff"),
            "http://status.example.org:8080/api/v1",
        )
    }

    #[test]
    fn test_encode_pads_to_block_size() {
        let codec = RecordCodec::new(1024).unwrap();
        let line = codec.encode(&sample_record()).unwrap();

        assert_eq!(line.len(), 1024);
        assert!(line.ends_with("#\n"));
        assert!(line.starts_with(r#"{"orderid":"jdoe-101914-093015""#));
    }

    #[test]
    fn test_round_trip() {
        let codec = RecordCodec::new(512).unwrap();
        let records = vec![
            sample_record(),
            WorkRecord::new(
                "ops-010115-000000",
                "MOD09GA.A2014001.h10v04.005.2014002032553",
                ProductOptions::new()
                    .with("include_source_data", true)
                    .with("browse_resolution", 250i64),
                "http://10.0.0.1/api/v1",
            ),
            // '#' inside a value must survive decoding
            WorkRecord::new(
                "a#b-010115-000000",
                "le70290302003123EDC00",
                ProductOptions::new().with("include_sr", true).with("note", "#1 priority"),
                "http://status/api/v1",
            ),
        ];

        for record in records {
            let line = codec.encode(&record).unwrap();
            assert_eq!(line.len(), 512);
            assert_eq!(codec.decode(&line).unwrap(), record);
        }
    }

    #[test]
    fn test_exact_fit() {
        let record = sample_record();
        let json_len = serde_json::to_string(&record).unwrap().len();

        let codec = RecordCodec::new(json_len + 1).unwrap();
        let line = codec.encode(&record).unwrap();
        assert_eq!(line.len(), json_len + 1);
        assert!(!line.contains('#'));
        assert_eq!(decode(&line).unwrap(), record);
    }

    #[test]
    fn test_oversized_record_fails_fast() {
        let record = sample_record();
        let json_len = serde_json::to_string(&record).unwrap().len();

        let codec = RecordCodec::new(json_len).unwrap();
        let err = codec.encode(&record).unwrap_err();
        assert!(err.is_configuration_error());
        assert!(matches!(
            err,
            RecordError::TooLong { length, capacity } if length == json_len && capacity == json_len - 1
        ));
    }

    #[test]
    fn test_invalid_block_size() {
        assert!(matches!(
            RecordCodec::new(1),
            Err(RecordError::InvalidBlockSize(1))
        ));
    }

    #[test]
    fn test_decode_tolerates_filler_variations() {
        let json = serde_json::to_string(&sample_record()).unwrap();

        for line in [
            json.clone(),
            format!("{}\n", json),
            format!("{}####", json),
            format!("{}#####\r\n", json),
            format!("{}## ##\n", json),
        ] {
            assert_eq!(decode(&line).unwrap(), sample_record());
        }
    }

    #[test]
    fn test_decode_rejects_invalid_scene() {
        let mut record = sample_record();
        record.scene = "LX99bogus".to_string();
        let line = RecordCodec::new(1024).unwrap().encode(&record).unwrap();

        let err = decode(&line).unwrap_err();
        assert!(matches!(err, RecordError::InvalidScene(_)));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode("########\n"),
            Err(RecordError::Malformed(_))
        ));
        assert!(matches!(decode(""), Err(RecordError::Malformed(_))));
        assert!(matches!(
            decode(r#"{"orderid":"x","scene":"LT50440341996220XXX01"}"#),
            Err(RecordError::Malformed(_))
        ));

        let json = serde_json::to_string(&sample_record()).unwrap();
        assert!(matches!(
            decode(&format!("{}##garbage", json)),
            Err(RecordError::TrailingData(_))
        ));
    }

    #[test]
    fn test_decode_rejects_empty_order() {
        let mut record = sample_record();
        record.order_id = " ".to_string();
        let json = serde_json::to_string(&record).unwrap();
        assert!(matches!(
            decode(&json),
            Err(RecordError::EmptyField("orderid"))
        ));
    }
}
