//! Object metadata as it appears in raw header lines and catalog rows.

use std::fmt;
use std::str::FromStr;

/// Number of partitions (detector readout quadrants) per field.
pub const PARTITIONS_PER_FIELD: u8 = 64;

/// Column names of the `.objects` catalog, in order.
pub const CATALOG_COLUMNS: [&str; 8] = [
    "id",
    "nepochs",
    "filterid",
    "fieldid",
    "rcid",
    "ra",
    "dec",
    "lightcurve_position",
];

/// Measurement band. The discriminant is the filter id used on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Band {
    G = 1,
    R = 2,
    I = 3,
}

impl Band {
    pub const ALL: [Band; 3] = [Band::G, Band::R, Band::I];

    pub fn from_filter_id(id: u8) -> Option<Band> {
        match id {
            1 => Some(Band::G),
            2 => Some(Band::R),
            3 => Some(Band::I),
            _ => None,
        }
    }

    pub fn filter_id(self) -> u8 {
        self as u8
    }

    pub fn letter(self) -> char {
        match self {
            Band::G => 'g',
            Band::R => 'r',
            Band::I => 'i',
        }
    }

    /// Every band except this one, in filter id order.
    pub fn others(self) -> impl Iterator<Item = Band> {
        Band::ALL.into_iter().filter(move |&b| b != self)
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-band", self.letter())
    }
}

impl FromStr for Band {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "g" | "1" => Ok(Band::G),
            "r" | "2" => Ok(Band::R),
            "i" | "3" => Ok(Band::I),
            other => Err(format!("unknown band {other:?} (expected g, r or i)")),
        }
    }
}

/// One object's metadata: the header line of one block in a raw file.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    pub id: u64,
    pub epoch_count: u32,
    pub band: Band,
    pub field_id: u32,
    pub partition_id: u8,
    /// Degrees, `[0, 360)`.
    pub ra: f64,
    /// Degrees, `[-90, 90]`.
    pub dec: f64,
    /// Offset of the header line in the raw file.
    pub byte_offset: u64,
}

impl ObjectRecord {
    /// Parse a raw header line (`# id nepochs filterid fieldid rcid ra dec`).
    ///
    /// The caller supplies the offset the line was read from; the line may
    /// still carry its terminator.
    pub fn parse_header(line: &str, byte_offset: u64) -> Result<Self, String> {
        let body = line
            .trim_end_matches(['\n', '\r'])
            .strip_prefix('#')
            .ok_or_else(|| "header line does not start with '#'".to_string())?;
        let fields: Vec<&str> = body.split_whitespace().collect();
        if fields.len() < 7 {
            return Err(format!(
                "header has {} fields, expected at least 7",
                fields.len()
            ));
        }
        Self::from_fields(&fields[..7], byte_offset)
    }

    fn from_fields(fields: &[&str], byte_offset: u64) -> Result<Self, String> {
        let id = parse_field::<u64>(fields[0], "id")?;
        let epoch_count = parse_field::<u32>(fields[1], "nepochs")?;
        let filter_id = parse_field::<u8>(fields[2], "filterid")?;
        let band = Band::from_filter_id(filter_id)
            .ok_or_else(|| format!("filterid {filter_id} is not 1, 2 or 3"))?;
        let field_id = parse_field::<u32>(fields[3], "fieldid")?;
        let partition_id = parse_field::<u8>(fields[4], "rcid")?;
        if partition_id >= PARTITIONS_PER_FIELD {
            return Err(format!("rcid {partition_id} is out of range 0..64"));
        }
        let ra = parse_field::<f64>(fields[5], "ra")?;
        let dec = parse_field::<f64>(fields[6], "dec")?;
        if !(0.0..360.0).contains(&ra) {
            return Err(format!("ra {ra} is outside [0, 360)"));
        }
        if !(-90.0..=90.0).contains(&dec) {
            return Err(format!("dec {dec} is outside [-90, 90]"));
        }
        Ok(ObjectRecord {
            id,
            epoch_count,
            band,
            field_id,
            partition_id,
            ra,
            dec,
            byte_offset,
        })
    }

    /// Format as one `.objects` catalog row, without the trailing newline.
    pub fn to_catalog_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{}",
            self.id,
            self.epoch_count,
            self.band.filter_id(),
            self.field_id,
            self.partition_id,
            self.ra,
            self.dec,
            self.byte_offset
        )
    }

    /// Parse one `.objects` catalog row; the last column is the raw-file offset.
    pub fn parse_catalog_row(row: &str) -> Result<Self, String> {
        let fields: Vec<&str> = row.trim_end_matches(['\n', '\r']).split(',').collect();
        if fields.len() != CATALOG_COLUMNS.len() {
            return Err(format!(
                "catalog row has {} columns, expected {}",
                fields.len(),
                CATALOG_COLUMNS.len()
            ));
        }
        let offset = parse_field::<u64>(fields[7], "lightcurve_position")?;
        Self::from_fields(&fields[..7], offset)
    }
}

fn parse_field<T: FromStr>(raw: &str, name: &str) -> Result<T, String> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| format!("cannot parse {name} from {raw:?}"))
}
