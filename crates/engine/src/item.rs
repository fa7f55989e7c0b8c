use rowflow_model::Record;

use crate::sink::FlushAck;
use crate::stage::sort::Collection;

/// Unit travelling between stages.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Record(Record),
    /// Sorted, fully materialized sequence produced by `sort_in`.
    Collection(Collection),
    /// Acknowledgement of a batch flushed by a batched sink.
    Ack(FlushAck),
}

impl Item {
    pub fn kind(&self) -> &'static str {
        match self {
            Item::Record(_) => "record",
            Item::Collection(_) => "collection",
            Item::Ack(_) => "ack",
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Item::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<Record> {
        match self {
            Item::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Number of records this item stands for.
    pub fn record_count(&self) -> u64 {
        match self {
            Item::Record(_) => 1,
            Item::Collection(collection) => collection.len() as u64,
            Item::Ack(ack) => ack.records as u64,
        }
    }
}

impl From<Record> for Item {
    fn from(record: Record) -> Self {
        Item::Record(record)
    }
}

impl From<Collection> for Item {
    fn from(collection: Collection) -> Self {
        Item::Collection(collection)
    }
}

impl From<FlushAck> for Item {
    fn from(ack: FlushAck) -> Self {
        Item::Ack(ack)
    }
}
