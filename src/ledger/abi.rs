//! The subset of the contract ABI encoding used by the voting contracts:
//! addresses, unsigned integers, booleans, strings and (nested) dynamic arrays.

use thiserror::Error;

use super::primitives::{keccak256, Address};

const WORD: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("data ended at byte {0} while decoding")]
    Truncated(usize),
    #[error("integer does not fit in 128 bits")]
    Overflow,
    #[error("malformed {0} value")]
    Malformed(&'static str),
    #[error("expected {expected}, found {found}")]
    UnexpectedToken {
        expected: &'static str,
        found: &'static str,
    },
    #[error("`{function}` takes {expected} arguments, {found} given")]
    ArgumentCount {
        function: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("calldata does not start with the selector of `{0}`")]
    WrongSelector(&'static str),
}

/// Static description of a parameter type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ParamType {
    Address,
    Uint,
    Bool,
    String,
    Array(&'static ParamType),
}

impl ParamType {
    /// Canonical type name, as used in function signatures.
    pub fn canonical(&self) -> String {
        match self {
            ParamType::Address => "address".to_string(),
            ParamType::Uint => "uint256".to_string(),
            ParamType::Bool => "bool".to_string(),
            ParamType::String => "string".to_string(),
            ParamType::Array(inner) => format!("{}[]", inner.canonical()),
        }
    }

    fn is_dynamic(&self) -> bool {
        matches!(self, ParamType::String | ParamType::Array(_))
    }
}

/// A decoded (or to-be-encoded) ABI value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Uint(u128),
    Bool(bool),
    String(String),
    Array(Vec<Token>),
}

impl Token {
    fn kind(&self) -> &'static str {
        match self {
            Token::Address(_) => "address",
            Token::Uint(_) => "uint256",
            Token::Bool(_) => "bool",
            Token::String(_) => "string",
            Token::Array(_) => "array",
        }
    }

    fn is_dynamic(&self) -> bool {
        matches!(self, Token::String(_) | Token::Array(_))
    }

    /// Does this token have the given type? Arrays check every element.
    pub fn matches(&self, param: &ParamType) -> bool {
        match (self, param) {
            (Token::Address(_), ParamType::Address)
            | (Token::Uint(_), ParamType::Uint)
            | (Token::Bool(_), ParamType::Bool)
            | (Token::String(_), ParamType::String) => true,
            (Token::Array(items), ParamType::Array(inner)) => {
                items.iter().all(|item| item.matches(inner))
            }
            _ => false,
        }
    }

    pub fn into_address(self) -> Result<Address, AbiError> {
        match self {
            Token::Address(address) => Ok(address),
            other => Err(other.unexpected("address")),
        }
    }

    pub fn into_uint(self) -> Result<u128, AbiError> {
        match self {
            Token::Uint(value) => Ok(value),
            other => Err(other.unexpected("uint256")),
        }
    }

    pub fn into_u64(self) -> Result<u64, AbiError> {
        u64::try_from(self.into_uint()?).map_err(|_| AbiError::Overflow)
    }

    pub fn into_bool(self) -> Result<bool, AbiError> {
        match self {
            Token::Bool(value) => Ok(value),
            other => Err(other.unexpected("bool")),
        }
    }

    pub fn into_string(self) -> Result<String, AbiError> {
        match self {
            Token::String(value) => Ok(value),
            other => Err(other.unexpected("string")),
        }
    }

    pub fn into_array(self) -> Result<Vec<Token>, AbiError> {
        match self {
            Token::Array(items) => Ok(items),
            other => Err(other.unexpected("array")),
        }
    }

    fn unexpected(&self, expected: &'static str) -> AbiError {
        AbiError::UnexpectedToken {
            expected,
            found: self.kind(),
        }
    }
}

/// Static description of a contract function (or custom error, which is
/// encoded identically).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: &'static str,
    pub inputs: &'static [ParamType],
    pub outputs: &'static [ParamType],
}

impl Function {
    pub const fn new(
        name: &'static str,
        inputs: &'static [ParamType],
        outputs: &'static [ParamType],
    ) -> Self {
        Self {
            name,
            inputs,
            outputs,
        }
    }

    /// e.g. `startElection(uint256,uint256)`.
    pub fn signature(&self) -> String {
        let inputs: Vec<String> = self.inputs.iter().map(ParamType::canonical).collect();
        format!("{}({})", self.name, inputs.join(","))
    }

    pub fn selector(&self) -> [u8; 4] {
        let hash = keccak256(self.signature());
        [hash[0], hash[1], hash[2], hash[3]]
    }

    /// Build calldata for a call of this function.
    pub fn encode_call(&self, args: &[Token]) -> Result<Vec<u8>, AbiError> {
        check_args(self.name, self.inputs, args)?;
        let mut data = self.selector().to_vec();
        data.extend(encode(args));
        Ok(data)
    }

    /// Decode the arguments of calldata addressed to this function.
    pub fn decode_input(&self, calldata: &[u8]) -> Result<Vec<Token>, AbiError> {
        match calldata.strip_prefix(&self.selector()[..]) {
            Some(args) => decode(self.inputs, args),
            None => Err(AbiError::WrongSelector(self.name)),
        }
    }

    /// Encode return values of this function.
    pub fn encode_output(&self, values: &[Token]) -> Result<Vec<u8>, AbiError> {
        check_args(self.name, self.outputs, values)?;
        Ok(encode(values))
    }

    pub fn decode_output(&self, data: &[u8]) -> Result<Vec<Token>, AbiError> {
        decode(self.outputs, data)
    }
}

fn check_args(
    function: &'static str,
    params: &[ParamType],
    args: &[Token],
) -> Result<(), AbiError> {
    if params.len() != args.len() {
        return Err(AbiError::ArgumentCount {
            function,
            expected: params.len(),
            found: args.len(),
        });
    }
    for (arg, param) in args.iter().zip(params) {
        if !arg.matches(param) {
            return Err(AbiError::UnexpectedToken {
                expected: match param {
                    ParamType::Address => "address",
                    ParamType::Uint => "uint256",
                    ParamType::Bool => "bool",
                    ParamType::String => "string",
                    ParamType::Array(_) => "array",
                },
                found: arg.kind(),
            });
        }
    }
    Ok(())
}

fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn pad_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(bytes);
    let rem = bytes.len() % WORD;
    if rem != 0 {
        out.extend(std::iter::repeat(0).take(WORD - rem));
    }
}

/// Encode a sequence of tokens as a tuple.
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();
    for token in tokens {
        if token.is_dynamic() {
            head.extend(uint_word((head_len + tail.len()) as u128));
            encode_dynamic(token, &mut tail);
        } else {
            head.extend(static_word(token));
        }
    }
    head.extend(tail);
    head
}

fn static_word(token: &Token) -> [u8; WORD] {
    match token {
        Token::Address(address) => {
            let mut word = [0; WORD];
            word[12..].copy_from_slice(address.as_bytes());
            word
        }
        Token::Uint(value) => uint_word(*value),
        Token::Bool(value) => uint_word(*value as u128),
        Token::String(_) | Token::Array(_) => unreachable!("dynamic token in static position"),
    }
}

fn encode_dynamic(token: &Token, out: &mut Vec<u8>) {
    match token {
        Token::String(text) => {
            out.extend(uint_word(text.len() as u128));
            pad_bytes(text.as_bytes(), out);
        }
        Token::Array(items) => {
            out.extend(uint_word(items.len() as u128));
            out.extend(encode(items));
        }
        _ => out.extend(static_word(token)),
    }
}

/// Decode a tuple of the given types.
pub fn decode(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>, AbiError> {
    decode_tuple(types.iter().copied(), data, 0)
}

fn decode_tuple(
    types: impl Iterator<Item = ParamType>,
    data: &[u8],
    base: usize,
) -> Result<Vec<Token>, AbiError> {
    types
        .enumerate()
        .map(|(i, param)| {
            let head = base + i * WORD;
            if param.is_dynamic() {
                let offset = read_usize(data, head)?;
                let start = base.checked_add(offset).ok_or(AbiError::Truncated(head))?;
                decode_dynamic(param, data, start)
            } else {
                decode_static(param, data, head)
            }
        })
        .collect()
}

fn read_word(data: &[u8], at: usize) -> Result<&[u8], AbiError> {
    let end = at.checked_add(WORD).ok_or(AbiError::Truncated(at))?;
    data.get(at..end).ok_or(AbiError::Truncated(data.len()))
}

fn read_uint(data: &[u8], at: usize) -> Result<u128, AbiError> {
    let word = read_word(data, at)?;
    if word[..16].iter().any(|b| *b != 0) {
        return Err(AbiError::Overflow);
    }
    let mut low = [0; 16];
    low.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(low))
}

fn read_usize(data: &[u8], at: usize) -> Result<usize, AbiError> {
    usize::try_from(read_uint(data, at)?).map_err(|_| AbiError::Overflow)
}

fn decode_static(param: ParamType, data: &[u8], at: usize) -> Result<Token, AbiError> {
    match param {
        ParamType::Address => {
            let word = read_word(data, at)?;
            if word[..12].iter().any(|b| *b != 0) {
                return Err(AbiError::Malformed("address"));
            }
            let mut address = [0; 20];
            address.copy_from_slice(&word[12..]);
            Ok(Token::Address(Address(address)))
        }
        ParamType::Uint => read_uint(data, at).map(Token::Uint),
        ParamType::Bool => match read_uint(data, at)? {
            0 => Ok(Token::Bool(false)),
            1 => Ok(Token::Bool(true)),
            _ => Err(AbiError::Malformed("bool")),
        },
        ParamType::String | ParamType::Array(_) => decode_dynamic(param, data, at),
    }
}

fn decode_dynamic(param: ParamType, data: &[u8], at: usize) -> Result<Token, AbiError> {
    let len = read_usize(data, at)?;
    let start = at + WORD;
    match param {
        ParamType::String => {
            let end = start.checked_add(len).ok_or(AbiError::Truncated(start))?;
            let bytes = data.get(start..end).ok_or(AbiError::Truncated(data.len()))?;
            String::from_utf8(bytes.to_vec())
                .map(Token::String)
                .map_err(|_| AbiError::Malformed("string"))
        }
        ParamType::Array(inner) => {
            // Each element needs at least one head word; reject absurd lengths early.
            if len > data.len() / WORD {
                return Err(AbiError::Truncated(data.len()));
            }
            decode_tuple(std::iter::repeat(*inner).take(len), data, start).map(Token::Array)
        }
        _ => decode_static(param, data, at),
    }
}
