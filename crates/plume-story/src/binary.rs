//! The `INKB` binary story format.
//!
//! A file is the magic `INKB`, a version byte and a `u32`-counted knot
//! table. Integers are little-endian and fixed width, strings carry a
//! `u16` byte length, and uuids use a 7-bit varint whose final byte has
//! the high bit set. Expressions are stored as source text and parsed
//! again on decode.

use std::rc::Rc;

use plume_core::Uuid;
use plume_expr::{Expression, NoSymbols};
use tracing::debug;

use crate::content::{
    Branch, Choice, ChoiceEntry, Conditional, Content, ContentObject, Divert, DivertKind,
    GlobalVariable, ListDeclaration, ListEntry, MixMarker, Sequence, SequenceKind,
};
use crate::error::{FormatError, StoryResult};
use crate::weave::{GatherPoint, Knot, Parameter, Stitch, StoryContent};

/// File magic.
pub const MAGIC: &[u8; 4] = b"INKB";

/// Format version written by [`encode`].
pub const VERSION: u8 = 1;

const MAX_UUID_BYTES: usize = 5;

const STICKY: u8 = 1;
const FALLBACK: u8 = 2;
const IMMEDIATE: u8 = 4;

type FormatResult<T> = Result<T, FormatError>;

/// Serialize a story.
pub fn encode(content: &StoryContent) -> StoryResult<Vec<u8>> {
    let mut writer = Writer::default();
    writer.bytes.extend_from_slice(MAGIC);
    writer.u8(VERSION);
    writer.count32(content.knots().len())?;
    for knot in content.knots() {
        writer.knot(knot)?;
    }
    debug!(knots = content.knots().len(), bytes = writer.bytes.len(), "story encoded");
    Ok(writer.bytes)
}

/// Deserialize a story and check its structure.
pub fn decode(bytes: &[u8]) -> StoryResult<StoryContent> {
    let mut reader = Reader { bytes, pos: 0 };
    if reader.take(MAGIC.len())? != MAGIC {
        return Err(FormatError::BadMagic.into());
    }
    let version = reader.u8()?;
    if version != VERSION {
        return Err(FormatError::UnsupportedVersion(version).into());
    }
    let count = reader.u32()?;
    let mut knots = Vec::new();
    for _ in 0..count {
        knots.push(reader.knot()?);
    }
    debug!(knots = knots.len(), "story decoded");
    Ok(StoryContent::new(knots)?)
}

#[derive(Default)]
struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    fn bool(&mut self, value: bool) {
        self.u8(u8::from(value));
    }

    fn u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn i64(&mut self, value: i64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn count16(&mut self, count: usize) -> FormatResult<()> {
        let count = u16::try_from(count).map_err(|_| FormatError::CountTooLarge(count))?;
        self.u16(count);
        Ok(())
    }

    fn count32(&mut self, count: usize) -> FormatResult<()> {
        let count = u32::try_from(count).map_err(|_| FormatError::CountTooLarge(count))?;
        self.u32(count);
        Ok(())
    }

    fn str(&mut self, value: &str) -> FormatResult<()> {
        let len = u16::try_from(value.len()).map_err(|_| FormatError::StringTooLong(value.len()))?;
        self.u16(len);
        self.bytes.extend_from_slice(value.as_bytes());
        Ok(())
    }

    fn uuid(&mut self, uuid: Uuid) {
        let mut rest = uuid.0;
        loop {
            let group = (rest & 0x7f) as u8;
            rest >>= 7;
            if rest == 0 {
                self.u8(group | 0x80);
                return;
            }
            self.u8(group);
        }
    }

    fn expr(&mut self, expr: &Expression) -> FormatResult<()> {
        self.str(expr.source())
    }

    fn exprs(&mut self, exprs: &[Expression]) -> FormatResult<()> {
        self.count16(exprs.len())?;
        exprs.iter().try_for_each(|e| self.expr(e))
    }

    fn knot(&mut self, knot: &Knot) -> FormatResult<()> {
        self.str(&knot.name)?;
        self.uuid(knot.uuid);
        self.count16(knot.parameters.len())?;
        for parameter in &knot.parameters {
            self.str(&parameter.name)?;
            self.bool(parameter.by_ref);
        }
        self.count16(knot.stitches.len())?;
        for stitch in &knot.stitches {
            self.str(&stitch.name)?;
            self.uuid(stitch.uuid);
            self.count32(stitch.offset)?;
            self.gathers(&stitch.gather_points)?;
        }
        self.gathers(&knot.gather_points)?;
        self.bool(knot.is_function);
        self.content(&knot.objects)
    }

    fn gathers(&mut self, gathers: &[GatherPoint]) -> FormatResult<()> {
        self.count16(gathers.len())?;
        for gather in gathers {
            self.str(&gather.name)?;
            self.uuid(gather.uuid);
            self.u16(gather.nesting_level);
            self.count32(gather.choice_index)?;
        }
        Ok(())
    }

    fn content(&mut self, content: &[ContentObject]) -> FormatResult<()> {
        self.count32(content.len())?;
        content.iter().try_for_each(|o| self.object(o))
    }

    fn object(&mut self, object: &ContentObject) -> FormatResult<()> {
        match object {
            ContentObject::Text(text) => {
                self.u8(0);
                self.str(text)?;
            }
            ContentObject::LineBreak => self.u8(1),
            ContentObject::Glue => self.u8(2),
            ContentObject::Divert(divert) => {
                self.u8(3);
                self.u8(match divert.kind {
                    DivertKind::Goto => 0,
                    DivertKind::Tunnel => 1,
                    DivertKind::TunnelReturn => 2,
                    DivertKind::Thread => 3,
                });
                self.bool(divert.target.is_some());
                if let Some(target) = &divert.target {
                    self.str(target)?;
                }
                self.exprs(&divert.args)?;
            }
            ContentObject::Choice(choice) => {
                self.u8(4);
                self.uuid(choice.id);
                self.count16(choice.entries.len())?;
                for entry in &choice.entries {
                    let mut flags = 0;
                    if entry.sticky {
                        flags |= STICKY;
                    }
                    if entry.fallback {
                        flags |= FALLBACK;
                    }
                    if entry.immediately_continue {
                        flags |= IMMEDIATE;
                    }
                    self.u8(flags);
                    self.content(&entry.text)?;
                    self.content(&entry.result)?;
                    self.exprs(&entry.conditions)?;
                }
            }
            ContentObject::ChoiceTextMix(marker) => {
                self.u8(5);
                self.u8(match marker {
                    MixMarker::Start => 0,
                    MixMarker::End => 1,
                });
            }
            ContentObject::Tag(tag) => {
                self.u8(6);
                self.str(tag)?;
            }
            ContentObject::Interpolation(expr) => {
                self.u8(7);
                self.expr(expr)?;
            }
            ContentObject::Conditional(conditional) => {
                self.u8(8);
                self.bool(conditional.switch.is_some());
                if let Some(switch) = &conditional.switch {
                    self.expr(switch)?;
                }
                self.count16(conditional.branches.len())?;
                for branch in &conditional.branches {
                    self.expr(&branch.condition)?;
                    self.content(&branch.content)?;
                }
                self.bool(conditional.otherwise.is_some());
                if let Some(otherwise) = &conditional.otherwise {
                    self.content(otherwise)?;
                }
            }
            ContentObject::Sequence(sequence) => {
                self.u8(9);
                self.uuid(sequence.id);
                self.u8(match sequence.kind {
                    SequenceKind::Sequence => 0,
                    SequenceKind::Cycle => 1,
                    SequenceKind::OnceOnly => 2,
                    SequenceKind::Shuffle => 3,
                    SequenceKind::ShuffleOnce => 4,
                    SequenceKind::ShuffleStop => 5,
                });
                self.count16(sequence.groups.len())?;
                sequence.groups.iter().try_for_each(|g| self.content(g))?;
            }
            ContentObject::GlobalVariable(global) => {
                self.u8(10);
                self.str(&global.name)?;
                self.expr(&global.init)?;
                self.bool(global.constant);
            }
            ContentObject::Logic(expr) => {
                self.u8(11);
                self.expr(expr)?;
            }
            ContentObject::ListDeclaration(list) => {
                self.u8(12);
                self.str(&list.name)?;
                self.count16(list.entries.len())?;
                for entry in &list.entries {
                    self.str(&entry.label)?;
                    self.i64(entry.value);
                    self.bool(entry.selected);
                }
            }
        }
        Ok(())
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> FormatResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(FormatError::UnexpectedEof)?;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(FormatError::UnexpectedEof)?;
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> FormatResult<[u8; N]> {
        let mut out = [0; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> FormatResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn bool(&mut self) -> FormatResult<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(FormatError::InvalidTag { what: "bool", tag }),
        }
    }

    fn u16(&mut self) -> FormatResult<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> FormatResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> FormatResult<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn index(&mut self) -> FormatResult<usize> {
        let value = self.u32()?;
        usize::try_from(value).map_err(|_| FormatError::CountTooLarge(usize::MAX))
    }

    fn str(&mut self) -> FormatResult<String> {
        let len = usize::from(self.u16()?);
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| FormatError::InvalidUtf8)
    }

    fn uuid(&mut self) -> FormatResult<Uuid> {
        let mut value: u64 = 0;
        for i in 0..MAX_UUID_BYTES {
            let byte = self.u8()?;
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 != 0 {
                let value = u32::try_from(value).map_err(|_| FormatError::UuidOverflow)?;
                return Ok(Uuid(value));
            }
        }
        Err(FormatError::UuidOverflow)
    }

    fn expr(&mut self) -> FormatResult<Expression> {
        let source = self.str()?;
        Expression::parse(&source, &NoSymbols).map_err(|error| FormatError::Expression {
            source_text: source,
            error,
        })
    }

    fn exprs(&mut self) -> FormatResult<Vec<Expression>> {
        let count = self.u16()?;
        (0..count).map(|_| self.expr()).collect()
    }

    fn knot(&mut self) -> FormatResult<Knot> {
        let name = self.str()?;
        let uuid = self.uuid()?;

        let mut parameters = Vec::new();
        for _ in 0..self.u16()? {
            parameters.push(Parameter {
                name: self.str()?,
                by_ref: self.bool()?,
            });
        }

        let mut stitches = Vec::new();
        for _ in 0..self.u16()? {
            stitches.push(Stitch {
                name: self.str()?,
                uuid: self.uuid()?,
                offset: self.index()?,
                gather_points: self.gathers()?,
            });
        }

        let gather_points = self.gathers()?;
        let is_function = self.bool()?;
        let objects = self.content()?;
        Ok(Knot {
            name,
            uuid,
            parameters,
            objects,
            stitches,
            gather_points,
            is_function,
        })
    }

    fn gathers(&mut self) -> FormatResult<Vec<GatherPoint>> {
        let mut gathers = Vec::new();
        for _ in 0..self.u16()? {
            gathers.push(GatherPoint {
                name: self.str()?,
                uuid: self.uuid()?,
                nesting_level: self.u16()?,
                choice_index: self.index()?,
            });
        }
        Ok(gathers)
    }

    fn content(&mut self) -> FormatResult<Content> {
        let count = self.u32()?;
        let mut objects = Vec::new();
        for _ in 0..count {
            objects.push(self.object()?);
        }
        Ok(Rc::new(objects))
    }

    fn object(&mut self) -> FormatResult<ContentObject> {
        let object = match self.u8()? {
            0 => ContentObject::Text(self.str()?),
            1 => ContentObject::LineBreak,
            2 => ContentObject::Glue,
            3 => {
                let kind = match self.u8()? {
                    0 => DivertKind::Goto,
                    1 => DivertKind::Tunnel,
                    2 => DivertKind::TunnelReturn,
                    3 => DivertKind::Thread,
                    tag => return Err(FormatError::InvalidTag { what: "divert kind", tag }),
                };
                let target = if self.bool()? { Some(self.str()?) } else { None };
                let args = self.exprs()?;
                ContentObject::Divert(Divert::new(kind, target).with_args(args))
            }
            4 => {
                let id = self.uuid()?;
                let mut entries = Vec::new();
                for _ in 0..self.u16()? {
                    let flags = self.u8()?;
                    let mut entry = ChoiceEntry::new(self.content()?, self.content()?);
                    entry.conditions = self.exprs()?;
                    entry.sticky = flags & STICKY != 0;
                    entry.fallback = flags & FALLBACK != 0;
                    entry.immediately_continue = flags & IMMEDIATE != 0;
                    entries.push(entry);
                }
                ContentObject::Choice(Choice { id, entries })
            }
            5 => ContentObject::ChoiceTextMix(match self.u8()? {
                0 => MixMarker::Start,
                1 => MixMarker::End,
                tag => return Err(FormatError::InvalidTag { what: "mix marker", tag }),
            }),
            6 => ContentObject::Tag(self.str()?),
            7 => ContentObject::Interpolation(self.expr()?),
            8 => {
                let switch = if self.bool()? { Some(self.expr()?) } else { None };
                let mut branches = Vec::new();
                for _ in 0..self.u16()? {
                    branches.push(Branch {
                        condition: self.expr()?,
                        content: self.content()?,
                    });
                }
                let otherwise = if self.bool()? { Some(self.content()?) } else { None };
                ContentObject::Conditional(Conditional {
                    switch,
                    branches,
                    otherwise,
                })
            }
            9 => {
                let id = self.uuid()?;
                let kind = match self.u8()? {
                    0 => SequenceKind::Sequence,
                    1 => SequenceKind::Cycle,
                    2 => SequenceKind::OnceOnly,
                    3 => SequenceKind::Shuffle,
                    4 => SequenceKind::ShuffleOnce,
                    5 => SequenceKind::ShuffleStop,
                    tag => return Err(FormatError::InvalidTag { what: "sequence kind", tag }),
                };
                let mut groups = Vec::new();
                for _ in 0..self.u16()? {
                    groups.push(self.content()?);
                }
                ContentObject::Sequence(Sequence { id, kind, groups })
            }
            10 => ContentObject::GlobalVariable(GlobalVariable {
                name: self.str()?,
                init: self.expr()?,
                constant: self.bool()?,
            }),
            11 => ContentObject::Logic(self.expr()?),
            12 => {
                let name = self.str()?;
                let mut entries = Vec::new();
                for _ in 0..self.u16()? {
                    entries.push(ListEntry {
                        label: self.str()?,
                        value: self.i64()?,
                        selected: self.bool()?,
                    });
                }
                ContentObject::ListDeclaration(ListDeclaration { name, entries })
            }
            tag => return Err(FormatError::InvalidTag { what: "content object", tag }),
        };
        Ok(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CompileContext;
    use crate::error::StoryError;

    fn sample() -> StoryContent {
        let mut ctx = CompileContext::new();
        ctx.knot("start", |k| {
            k.list("Mood", &[("calm", 1, true), ("angry", 2, false)])
                .global("gold", "10")
                .tag("intro")
                .text("Gold: ")
                .interpolate("gold")
                .line_break();
            k.choice(|c| {
                c.entry(|e| {
                    e.mixed("Go", " east", " eastwards")
                        .condition("gold > 5")
                        .sticky()
                        .result(|r| {
                            r.divert_with("east", &["gold"]);
                        });
                });
                c.fallback(|r| {
                    r.end();
                });
            });
            k.gather("after");
            k.switch("gold", |s| {
                s.when("10", |b| {
                    b.line("Ten.");
                })
                .otherwise(|b| {
                    b.line("Other.");
                });
            });
            k.stitch("side");
            k.sequence(SequenceKind::ShuffleStop, |s| {
                s.text("a").text("b");
            })
            .logic("gold = gold + 1")
            .glue()
            .tunnel_return();
        });
        ctx.knot("east", |k| {
            k.ref_param("amount").thread("start.side").done();
        });
        ctx.finish().unwrap()
    }

    #[test]
    fn round_trip_preserves_tree() {
        let content = sample();
        let bytes = encode(&content).unwrap();
        assert_eq!(&bytes[..4], MAGIC);
        assert_eq!(bytes[4], VERSION);
        assert_eq!(decode(&bytes).unwrap(), content);
    }

    #[test]
    fn uuid_varint_marks_last_byte() {
        let mut writer = Writer::default();
        writer.uuid(Uuid(5));
        writer.uuid(Uuid(300));
        writer.uuid(Uuid(u32::MAX));
        assert_eq!(&writer.bytes[..3], &[0x85, 0x2c, 0x82]);
        assert_eq!(writer.bytes.len(), 3 + 5);

        let mut reader = Reader {
            bytes: &writer.bytes,
            pos: 0,
        };
        assert_eq!(reader.uuid().unwrap(), Uuid(5));
        assert_eq!(reader.uuid().unwrap(), Uuid(300));
        assert_eq!(reader.uuid().unwrap(), Uuid(u32::MAX));
    }

    #[test]
    fn unterminated_uuid_overflows() {
        let mut reader = Reader {
            bytes: &[0x01; 6],
            pos: 0,
        };
        assert!(matches!(reader.uuid(), Err(FormatError::UuidOverflow)));
    }

    #[test]
    fn rejects_bad_headers() {
        assert!(matches!(
            decode(b"JSON\x01"),
            Err(StoryError::Format(FormatError::BadMagic))
        ));
        assert!(matches!(
            decode(b"INKB\x07\0\0\0\0"),
            Err(StoryError::Format(FormatError::UnsupportedVersion(7)))
        ));
        assert!(matches!(
            decode(b"IN"),
            Err(StoryError::Format(FormatError::UnexpectedEof))
        ));
    }

    #[test]
    fn truncated_body_is_eof() {
        let bytes = encode(&sample()).unwrap();
        let cut = &bytes[..bytes.len() - 3];
        assert!(matches!(
            decode(cut),
            Err(StoryError::Format(FormatError::UnexpectedEof))
        ));
    }

    #[test]
    fn unknown_object_tag() {
        let mut bytes = MAGIC.to_vec();
        bytes.push(VERSION);
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&[1, 0, b'k', 0x80, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 99]);
        assert!(matches!(
            decode(&bytes),
            Err(StoryError::Format(FormatError::InvalidTag {
                what: "content object",
                tag: 99
            }))
        ));
    }
}
