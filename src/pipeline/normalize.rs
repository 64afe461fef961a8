//! Raw row to [`SchoolRecord`] coercion.
//!
//! Each record field has one rule below: a text rule with its default (or
//! required), a count rule with its default, or a nullable float rule. Blank
//! cells take the default; present cells are trimmed and coerced. A present
//! value that fails coercion fails the whole record; it is never replaced by
//! the default.

use crate::constants::{DEFAULT_FLAG, DEFAULT_LEVEL, DEFAULT_LOCATION};
use crate::error::{ImportError, Result};
use crate::types::{Cell, RawSchoolRow, SchoolRecord};

/// Target fields of a [`SchoolRecord`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    SchoolCode,
    Name,
    Region,
    District,
    Level,
    SchoolType,
    Address,
    Postcode,
    City,
    Phone,
    Fax,
    Email,
    Location,
    CoordX,
    CoordY,
    StudentCount,
    TeacherCount,
    Preschool,
    Integration,
    Assistance,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::SchoolCode => "school_code",
            Field::Name => "name",
            Field::Region => "region",
            Field::District => "district",
            Field::Level => "level",
            Field::SchoolType => "school_type",
            Field::Address => "address",
            Field::Postcode => "postcode",
            Field::City => "city",
            Field::Phone => "phone",
            Field::Fax => "fax",
            Field::Email => "email",
            Field::Location => "location",
            Field::CoordX => "coord_x",
            Field::CoordY => "coord_y",
            Field::StudentCount => "student_count",
            Field::TeacherCount => "teacher_count",
            Field::Preschool => "preschool",
            Field::Integration => "integration",
            Field::Assistance => "assistance",
        }
    }

    fn cell(self, row: &RawSchoolRow) -> &Cell {
        match self {
            Field::SchoolCode => &row.code,
            Field::Name => &row.name,
            Field::Region => &row.region,
            Field::District => &row.district,
            Field::Level => &row.level,
            Field::SchoolType => &row.school_type,
            Field::Address => &row.address,
            Field::Postcode => &row.postcode,
            Field::City => &row.city,
            Field::Phone => &row.phone,
            Field::Fax => &row.fax,
            Field::Email => &row.email,
            Field::Location => &row.location,
            Field::CoordX => &row.coord_x,
            Field::CoordY => &row.coord_y,
            Field::StudentCount => &row.student_count,
            Field::TeacherCount => &row.teacher_count,
            Field::Preschool => &row.preschool,
            Field::Integration => &row.integration,
            Field::Assistance => &row.assistance,
        }
    }
}

/// Text field; `default: None` makes it required
#[derive(Debug, Clone, Copy)]
pub struct TextRule {
    pub field: Field,
    pub default: Option<&'static str>,
}

/// Non-negative integer field
#[derive(Debug, Clone, Copy)]
pub struct CountRule {
    pub field: Field,
    pub default: u32,
}

/// Nullable float field
#[derive(Debug, Clone, Copy)]
pub struct FloatRule {
    pub field: Field,
}

const fn text(field: Field, default: &'static str) -> TextRule {
    TextRule {
        field,
        default: Some(default),
    }
}

pub const SCHOOL_CODE: TextRule = TextRule {
    field: Field::SchoolCode,
    default: None,
};
pub const NAME: TextRule = text(Field::Name, "");
pub const REGION: TextRule = text(Field::Region, "");
pub const DISTRICT: TextRule = text(Field::District, "");
pub const LEVEL: TextRule = text(Field::Level, DEFAULT_LEVEL);
pub const SCHOOL_TYPE: TextRule = text(Field::SchoolType, "");
pub const ADDRESS: TextRule = text(Field::Address, "");
pub const POSTCODE: TextRule = text(Field::Postcode, "");
pub const CITY: TextRule = text(Field::City, "");
pub const PHONE: TextRule = text(Field::Phone, "");
pub const FAX: TextRule = text(Field::Fax, "");
pub const EMAIL: TextRule = text(Field::Email, "");
pub const LOCATION: TextRule = text(Field::Location, DEFAULT_LOCATION);
pub const COORD_X: FloatRule = FloatRule {
    field: Field::CoordX,
};
pub const COORD_Y: FloatRule = FloatRule {
    field: Field::CoordY,
};
pub const STUDENT_COUNT: CountRule = CountRule {
    field: Field::StudentCount,
    default: 0,
};
pub const TEACHER_COUNT: CountRule = CountRule {
    field: Field::TeacherCount,
    default: 0,
};
pub const PRESCHOOL: TextRule = text(Field::Preschool, DEFAULT_FLAG);
pub const INTEGRATION: TextRule = text(Field::Integration, DEFAULT_FLAG);
pub const ASSISTANCE: TextRule = text(Field::Assistance, "");

impl TextRule {
    pub fn read(&self, row: &RawSchoolRow) -> Result<String> {
        let cell = self.field.cell(row);
        if let Cell::Malformed(_) = cell {
            return Err(coercion_error(self.field, cell, "UTF-8 text"));
        }
        match (cell.to_text(), self.default) {
            (Some(text), _) => Ok(text),
            (None, Some(default)) => Ok(default.to_string()),
            (None, None) => Err(ImportError::MissingField(self.field.name().to_string())),
        }
    }
}

impl CountRule {
    pub fn read(&self, row: &RawSchoolRow) -> Result<u32> {
        let cell = self.field.cell(row);
        if cell.is_blank() {
            return Ok(self.default);
        }
        coerce_count(cell).ok_or_else(|| coercion_error(self.field, cell, "non-negative integer"))
    }
}

impl FloatRule {
    pub fn read(&self, row: &RawSchoolRow) -> Result<Option<f64>> {
        let cell = self.field.cell(row);
        if cell.is_blank() {
            return Ok(None);
        }
        coerce_float(cell)
            .map(Some)
            .ok_or_else(|| coercion_error(self.field, cell, "number"))
    }
}

/// Coerce one raw row into a record
pub fn normalize(row: &RawSchoolRow) -> Result<SchoolRecord> {
    Ok(SchoolRecord {
        school_code: SCHOOL_CODE.read(row)?,
        name: NAME.read(row)?,
        region: REGION.read(row)?,
        district: DISTRICT.read(row)?,
        level: LEVEL.read(row)?,
        school_type: SCHOOL_TYPE.read(row)?,
        address: ADDRESS.read(row)?,
        postcode: POSTCODE.read(row)?,
        city: CITY.read(row)?,
        phone: PHONE.read(row)?,
        fax: FAX.read(row)?,
        email: EMAIL.read(row)?,
        location: LOCATION.read(row)?,
        coord_x: COORD_X.read(row)?,
        coord_y: COORD_Y.read(row)?,
        student_count: STUDENT_COUNT.read(row)?,
        teacher_count: TEACHER_COUNT.read(row)?,
        preschool: PRESCHOOL.read(row)?,
        integration: INTEGRATION.read(row)?,
        assistance: ASSISTANCE.read(row)?,
    })
}

fn coerce_count(cell: &Cell) -> Option<u32> {
    match cell {
        Cell::Int(i) => u32::try_from(*i).ok(),
        Cell::Float(f) => float_to_count(*f),
        Cell::Text(s) => {
            let s = s.trim();
            s.parse::<u32>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(float_to_count))
        }
        Cell::Bool(_) | Cell::Malformed(_) | Cell::Empty => None,
    }
}

fn float_to_count(f: f64) -> Option<u32> {
    if f.is_finite() && f.fract() == 0.0 && f >= 0.0 && f <= u32::MAX as f64 {
        Some(f as u32)
    } else {
        None
    }
}

fn coerce_float(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Int(i) => Some(*i as f64),
        Cell::Float(f) if f.is_finite() => Some(*f),
        Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn coercion_error(field: Field, cell: &Cell, expected: &'static str) -> ImportError {
    ImportError::Coercion {
        field: field.name(),
        value: cell.to_text().unwrap_or_default(),
        expected,
    }
}
