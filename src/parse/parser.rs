//! Descriptor text parser.
//!
//! Accepted shape: `<device>[:<offset>[:<init-offset>]] [param=value ...]`, where `/` may stand
//! in for either `:`. Offsets are arithmetic over integer literals with `*` binding tighter than
//! `+`/`-`, or a reference to another client's value (`'name'` or `(name)`) with an optional
//! scale and constant. Parameters are single-letter keys, case-insensitive, separated by
//! whitespace or commas.
use std::time::Duration;

use log::debug;

use super::{
    descriptor::{Descriptor, LinkedOffset, Offset, Packing},
    expr::{Constant, ExprProgram, OpCode},
    links::{Link, LinkError, OffsetLinks},
    literal::parse_numeric_literal,
    scanner::Scanner,
};
use crate::{
    device::{DeviceHandle, Priority, Registry},
    dispatch::Transaction,
    error::{RegDevError, RegDevResult},
    types::{DataType, RawBounds},
};

/// Element length used for strings without an explicit `L=`.
pub const DEFAULT_STRING_LEN: usize = 40;

const DEFAULT_TYPE: DataType = DataType::Int16;

pub struct Parser<'r> {
    registry: &'r Registry,
    links: Option<&'r dyn OffsetLinks>,
}

impl<'r> Parser<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            links: None,
        }
    }

    /// Resolve `'name'`/`(name)` offset references through `links`.
    pub fn with_links(mut self, links: &'r dyn OffsetLinks) -> Self {
        self.links = Some(links);
        self
    }

    /// Parse the client's link; only instrument addresses describe a register.
    pub fn parse_link(&self, client: &str, link: &Link<'_>) -> RegDevResult<Descriptor> {
        match link {
            Link::Instrument(text) => self.parse(client, text),
            other => Err(RegDevError::BadArgumentType {
                client: client.to_string(),
                reason: format!("{} link is not an instrument address", other.kind()),
            }),
        }
    }

    pub fn parse(&self, client: &str, text: &str) -> RegDevResult<Descriptor> {
        let mut session = Session {
            parser: self,
            client,
            scanner: Scanner::new(text),
        };
        let descriptor = session.run()?;
        debug!(
            "{client}: {}:{} type={} dlen={}",
            descriptor.device.name(),
            descriptor.offset,
            descriptor.data_type,
            descriptor.dlen
        );
        Ok(descriptor)
    }
}

/// Raw parameter values before defaults and validation.
#[derive(Default)]
struct Params {
    data_type: Option<DataType>,
    bit: Option<u64>,
    invert: Option<i128>,
    low: Option<i128>,
    high: Option<i128>,
    packing: Packing,
    update_ms: Option<u64>,
}

struct Session<'p, 'r, 's> {
    parser: &'p Parser<'r>,
    client: &'s str,
    scanner: Scanner<'s>,
}

impl Session<'_, '_, '_> {
    fn bad(&self, reason: impl Into<String>) -> RegDevError {
        RegDevError::BadArgument {
            client: self.client.to_string(),
            reason: reason.into(),
        }
    }

    fn bad_at(&self, reason: &str) -> RegDevError {
        self.bad(format!("{reason} at column {}", self.scanner.column()))
    }

    fn run(&mut self) -> RegDevResult<Descriptor> {
        self.scanner.skip_whitespace();
        let device = self.device()?;

        let mut offset = Offset::Fixed(0);
        let mut init_offset = None;
        if self.separator() {
            if !self.at_field_end() {
                offset = self.offset()?;
            }
            if self.separator() {
                let init = self.literal_expr("init offset")?;
                init_offset = Some(self.non_negative(init, "init offset")?);
            }
        }
        if !self.at_field_end() {
            return Err(self.bad_at("unexpected character in address"));
        }

        let params = self.params()?;
        self.build(device, offset, init_offset, params)
    }

    fn device(&mut self) -> RegDevResult<DeviceHandle> {
        let name = self
            .scanner
            .take_while(|c| c != ':' && c != '/' && !c.is_whitespace());
        if name.is_empty() {
            return Err(self.bad("missing device name"));
        }
        self.parser
            .registry
            .find(name)
            .ok_or_else(|| RegDevError::NoDevice {
                client: self.client.to_string(),
                device: name.to_string(),
            })
    }

    fn separator(&mut self) -> bool {
        self.scanner.eat(':') || self.scanner.eat('/')
    }

    fn at_field_end(&self) -> bool {
        match self.scanner.peek() {
            None => true,
            Some(c) => c.is_whitespace() || c == ',' || c == ':' || c == '/',
        }
    }

    fn offset(&mut self) -> RegDevResult<Offset> {
        if let Some(name) = self.reference_name()? {
            return self.linked_offset(name);
        }
        let value = self.literal_expr("offset")?;
        Ok(Offset::Fixed(self.non_negative(value, "offset")?))
    }

    /// `'name'` or `(name)`. A parenthesis opens a reference only when it is not followed by
    /// something that starts an arithmetic value.
    fn reference_name(&mut self) -> RegDevResult<Option<String>> {
        let close = match self.scanner.peek() {
            Some('\'') => '\'',
            Some('(') => {
                let mut lookahead = Scanner::new(self.scanner.rest());
                lookahead.bump();
                match lookahead.peek_past_whitespace() {
                    Some(c) if c.is_ascii_digit() || matches!(c, '+' | '-' | '(') => {
                        return Ok(None);
                    }
                    _ => ')',
                }
            }
            _ => return Ok(None),
        };
        self.scanner.bump();
        let name = self.scanner.take_while(|c| c != close).trim().to_string();
        if !self.scanner.eat(close) {
            return Err(self.bad_at("unterminated offset reference"));
        }
        if name.is_empty() {
            return Err(self.bad("empty offset reference"));
        }
        Ok(Some(name))
    }

    fn linked_offset(&mut self, name: String) -> RegDevResult<Offset> {
        let Some(links) = self.parser.links else {
            return Err(self.bad(format!("offset reference '{name}' has no link table")));
        };
        let source = links.lookup(&name).map_err(|err| self.link_error(err))?;
        if !source.is_numeric() {
            return Err(self.link_error(LinkError::NotNumeric(name)));
        }
        let mut program = ExprProgram::new();
        program.push(OpCode::ReadLink);
        while self.eat_operator('*') {
            self.value(&mut program)?;
            program.push(OpCode::Mul);
        }
        self.sum_tail(&mut program)?;
        Ok(Offset::Linked(LinkedOffset::new(name, source, program)))
    }

    fn link_error(&self, err: LinkError) -> RegDevError {
        match err {
            LinkError::NotNumeric(_) => RegDevError::BadArgumentType {
                client: self.client.to_string(),
                reason: err.to_string(),
            },
            other => self.bad(other.to_string()),
        }
    }

    fn literal_expr(&mut self, what: &str) -> RegDevResult<i128> {
        let mut program = ExprProgram::new();
        self.expr(&mut program)?;
        program
            .evaluate(&mut Constant)
            .map_err(|_| self.bad(format!("{what} must be a literal expression")))
    }

    fn non_negative(&self, value: i128, what: &str) -> RegDevResult<usize> {
        usize::try_from(value).map_err(|_| {
            if value < 0 {
                self.bad(format!("negative {what} {value}"))
            } else {
                self.bad(format!("{what} {value} too large"))
            }
        })
    }

    // expr := term (('+'|'-') term)*
    fn expr(&mut self, program: &mut ExprProgram) -> RegDevResult<()> {
        self.term(program)?;
        self.sum_tail(program)
    }

    /// Consume `op` if it is the next non-blank character; blanks before anything else are
    /// left for the parameter list.
    fn eat_operator(&mut self, op: char) -> bool {
        if self.scanner.peek_past_whitespace() != Some(op) {
            return false;
        }
        self.scanner.skip_whitespace();
        self.scanner.eat(op)
    }

    fn sum_tail(&mut self, program: &mut ExprProgram) -> RegDevResult<()> {
        loop {
            let op = if self.eat_operator('+') {
                OpCode::Add
            } else if self.eat_operator('-') {
                OpCode::Sub
            } else {
                return Ok(());
            };
            self.term(program)?;
            program.push(op);
        }
    }

    // term := value ('*' value)*
    fn term(&mut self, program: &mut ExprProgram) -> RegDevResult<()> {
        self.value(program)?;
        loop {
            if !self.eat_operator('*') {
                return Ok(());
            }
            self.value(program)?;
            program.push(OpCode::Mul);
        }
    }

    // value := ['+'|'-'] (literal | '(' expr ')')
    fn value(&mut self, program: &mut ExprProgram) -> RegDevResult<()> {
        self.scanner.skip_whitespace();
        let negate = if self.scanner.eat('-') {
            true
        } else {
            self.scanner.eat('+');
            false
        };
        self.scanner.skip_whitespace();
        match self.scanner.peek() {
            Some('(') => {
                self.scanner.bump();
                self.expr(program)?;
                self.scanner.skip_whitespace();
                if !self.scanner.eat(')') {
                    return Err(self.bad_at("unbalanced parentheses"));
                }
            }
            Some(c) if c.is_ascii_digit() => {
                let token = self
                    .scanner
                    .take_while(|c| c.is_ascii_alphanumeric() || c == '_');
                let value = parse_numeric_literal(token)
                    .map_err(|_| self.bad(format!("bad numeric literal '{token}'")))?;
                program.push(OpCode::PushConst(value.into()));
            }
            _ => return Err(self.bad_at("expected a number or '('")),
        }
        if negate {
            program.push(OpCode::Neg);
        }
        Ok(())
    }

    fn params(&mut self) -> RegDevResult<Params> {
        let mut params = Params::default();
        loop {
            self.scanner.take_while(|c| c.is_whitespace() || c == ',');
            let Some(key) = self.scanner.bump() else {
                return Ok(params);
            };
            self.scanner.skip_whitespace();
            if !self.scanner.eat('=') {
                return Err(self.bad_at(&format!("expected '=' after parameter '{key}'")));
            }
            self.scanner.skip_whitespace();
            let value = self
                .scanner
                .take_while(|c| !c.is_whitespace() && c != ',');
            if value.is_empty() {
                return Err(self.bad(format!("parameter '{key}' has no value")));
            }
            match key.to_ascii_uppercase() {
                'T' => {
                    let ty = DataType::lookup(value)
                        .ok_or_else(|| self.bad(format!("unknown data type '{value}'")))?;
                    params.data_type = Some(ty);
                }
                'B' => params.bit = Some(self.unsigned(key, value)?),
                'I' => params.invert = Some(self.param_expr(key, value)?),
                'L' => params.low = Some(self.param_expr(key, value)?),
                'H' => params.high = Some(self.param_expr(key, value)?),
                'P' => params.packing = Packing::Fifo(self.factor(key, value)?),
                'A' => params.packing = Packing::Array(self.factor(key, value)?),
                'U' => params.update_ms = Some(self.unsigned(key, value)?),
                _ => return Err(self.bad(format!("unknown parameter '{key}'"))),
            }
        }
    }

    fn unsigned(&self, key: char, value: &str) -> RegDevResult<u64> {
        parse_numeric_literal(value)
            .map_err(|reason| self.bad(format!("parameter '{key}={value}': {reason}")))
    }

    fn factor(&self, key: char, value: &str) -> RegDevResult<usize> {
        match self.unsigned(key, value)? {
            0 => Err(self.bad(format!("packing factor '{key}' must be at least 1"))),
            n => usize::try_from(n).map_err(|_| self.bad(format!("packing factor {n} too large"))),
        }
    }

    fn param_expr(&self, key: char, value: &str) -> RegDevResult<i128> {
        let mut sub = Session {
            parser: self.parser,
            client: self.client,
            scanner: Scanner::new(value),
        };
        let result = sub.literal_expr("parameter")?;
        if !sub.scanner.is_done() {
            return Err(self.bad(format!("malformed expression in '{key}={value}'")));
        }
        Ok(result)
    }

    fn build(
        &self,
        device: DeviceHandle,
        offset: Offset,
        init_offset: Option<usize>,
        params: Params,
    ) -> RegDevResult<Descriptor> {
        let data_type = params.data_type.unwrap_or(DEFAULT_TYPE);

        let dlen = match data_type.width() {
            Some(width) => width,
            None => {
                if params.high.is_some() {
                    return Err(self.bad("'H' does not apply to strings"));
                }
                match params.low {
                    None => DEFAULT_STRING_LEN,
                    Some(len) => match usize::try_from(len) {
                        Ok(len) if len > 0 => len,
                        _ => return Err(self.bad(format!("bad string length {len}"))),
                    },
                }
            }
        };

        let bit = match params.bit {
            None => None,
            Some(bit) if bit < (dlen as u64 * 8).min(64) => Some(bit as u32),
            Some(bit) => {
                return Err(self.bad(format!("bit {bit} out of range for {dlen}-byte {data_type}")));
            }
        };

        let bounds = self.bounds(data_type, params.low, params.high)?;

        match params.packing {
            Packing::Fifo(n) if dlen % n != 0 => {
                return Err(self.bad(format!("fifo packing {n} does not divide {dlen}-byte element")));
            }
            Packing::Array(n) if dlen.checked_mul(n).is_none() => {
                return Err(self.bad(format!("array packing {n} too large for {dlen}-byte element")));
            }
            _ => {}
        }

        let invert = match params.invert {
            None => 0,
            // Negative masks keep their two's complement bits.
            Some(mask) if (i128::from(i64::MIN)..=i128::from(u64::MAX)).contains(&mask) => {
                mask as u64
            }
            Some(mask) => return Err(self.bad(format!("invert mask {mask} exceeds 64 bits"))),
        };

        Ok(Descriptor {
            client: self.client.to_string(),
            device,
            offset,
            init_offset,
            data_type,
            dlen,
            bit,
            invert,
            bounds,
            packing: params.packing,
            update: params.update_ms.map(Duration::from_millis),
            priority: Priority::Low,
            txn: Transaction::new(self.client),
        })
    }

    fn bounds(
        &self,
        data_type: DataType,
        low: Option<i128>,
        high: Option<i128>,
    ) -> RegDevResult<Option<RawBounds>> {
        if data_type == DataType::String {
            return Ok(None);
        }
        if data_type.is_float() {
            return Ok(match (low, high) {
                (Some(low), Some(high)) => Some(RawBounds::new(low, high)),
                _ => None,
            });
        }
        let (Some(defaults), Some(limits)) = (data_type.default_bounds(), data_type.bound_limits())
        else {
            return Ok(None);
        };
        let check = |value: Option<i128>, name: char| -> RegDevResult<Option<i128>> {
            match value {
                Some(v) if v < limits.low || v > limits.high => {
                    Err(self.bad(format!("{name}={v} out of range for {data_type}")))
                }
                other => Ok(other),
            }
        };
        let bounds = RawBounds::new(
            check(low, 'L')?.unwrap_or(defaults.low),
            check(high, 'H')?.unwrap_or(defaults.high),
        );
        if bounds.low == bounds.high {
            return Err(self.bad(format!("L and H are both {}", bounds.low)));
        }
        Ok(Some(bounds))
    }
}
