/// GLSL interface reader for the headless context
///
/// The headless context never runs shaders. It only needs what a driver
/// reports back: compile and link status, the info log, the active uniforms
/// and uniform blocks. This module reads the declarations of a GLSL ES
/// source (structs, default-block uniforms, uniform blocks, the presence of
/// `main`) and skips every function body.
///
/// Every declared uniform is reported active; nothing is optimized away.

use std::rc::Rc;

use galaxy_3d_gpu::galaxy3d::context::{ActiveUniform, ActiveUniformBlock, ContextTier, UniformType};
use galaxy_3d_gpu::galaxy3d::resource::{ShaderType, StructType};
use rustc_hash::FxHashMap;

const PRECISION_QUALIFIERS: &[&str] = &["lowp", "mediump", "highp"];
const SKIPPED_QUALIFIERS: &[&str] = &[
    "in", "out", "attribute", "varying", "const", "flat", "smooth", "centroid", "invariant",
];

/// Declarations read from one shader stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderInterface {
    /// GLSL ES version (100 or 300)
    pub version: u32,
    /// Default-block uniforms, in declaration order
    pub uniforms: Vec<(String, ShaderType)>,
    pub blocks: Vec<DeclaredBlock>,
}

/// A `uniform Name { ... } instance;` declaration
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredBlock {
    pub name: String,
    pub instance: Option<String>,
    pub layout: StructType,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(String),
    Punct(char),
}

#[derive(Debug, Clone)]
struct Lexed {
    token: Token,
    line: u32,
}

fn compile_error(line: u32, near: &str, message: &str) -> String {
    format!("ERROR: 0:{}: '{}' : {}\n", line, near, message)
}

/// Replace comments by spaces, keeping line breaks so line numbers hold
fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut previous = ' ';
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                    }
                    if previous == '*' && next == '/' {
                        break;
                    }
                    previous = next;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

struct Preprocessed {
    version: u32,
    defines: FxHashMap<String, String>,
    tokens: Vec<Lexed>,
}

fn preprocess(source: &str) -> Result<Preprocessed, String> {
    let mut version = 100;
    let mut defines = FxHashMap::default();
    let mut tokens = Vec::new();

    for (index, line) in strip_comments(source).lines().enumerate() {
        let number = index as u32 + 1;
        let trimmed = line.trim_start();
        if let Some(directive) = trimmed.strip_prefix('#') {
            let mut words = directive.split_whitespace();
            match words.next() {
                Some("version") => {
                    version = match words.next() {
                        Some("100") => 100,
                        Some("300") if words.next() == Some("es") => 300,
                        other => {
                            return Err(compile_error(
                                number,
                                other.unwrap_or(""),
                                "unsupported version",
                            ))
                        }
                    };
                }
                Some("error") => {
                    let rest: Vec<&str> = words.collect();
                    return Err(compile_error(number, "#error", &rest.join(" ")));
                }
                Some("define") => {
                    if let Some(name) = words.next() {
                        let value: Vec<&str> = words.collect();
                        defines.insert(name.to_string(), value.join(" "));
                    }
                }
                _ => {}
            }
            continue;
        }
        tokenize_line(line, number, &mut tokens);
    }
    Ok(Preprocessed { version, defines, tokens })
}

fn tokenize_line(line: &str, number: u32, tokens: &mut Vec<Lexed>) {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        let token = if c.is_ascii_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            Token::Ident(chars[start..i].iter().collect())
        } else if c.is_ascii_digit() {
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                i += 1;
            }
            Token::Number(chars[start..i].iter().collect())
        } else {
            i += 1;
            Token::Punct(c)
        };
        tokens.push(Lexed { token, line: number });
    }
}

struct Parser<'a> {
    tokens: &'a [Lexed],
    pos: usize,
    tier: ContextTier,
    version: u32,
    defines: &'a FxHashMap<String, String>,
    structs: FxHashMap<String, Rc<StructType>>,
    interface: ShaderInterface,
    has_main: bool,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn line(&self) -> u32 {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn error(&self, message: &str) -> String {
        let near = match self.peek() {
            Some(Token::Ident(s)) | Some(Token::Number(s)) => s.clone(),
            Some(Token::Punct(c)) => c.to_string(),
            None => "end of file".to_string(),
        };
        compile_error(self.line(), &near, message)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|t| t.token.clone());
        self.pos += 1;
        token
    }

    fn is_punct(&self, c: char) -> bool {
        self.peek() == Some(&Token::Punct(c))
    }

    fn expect_punct(&mut self, c: char) -> Result<(), String> {
        if self.is_punct(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("syntax error, expected '{}'", c)))
        }
    }

    fn expect_ident(&mut self) -> Result<String, String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error("syntax error, expected an identifier")),
        }
    }

    fn skip_precision(&mut self) {
        while matches!(self.peek(), Some(Token::Ident(q)) if PRECISION_QUALIFIERS.contains(&q.as_str())) {
            self.pos += 1;
        }
    }

    /// Skip a balanced `open ... close` group starting at the current token
    fn skip_group(&mut self, open: char, close: char) -> Result<(), String> {
        let start_line = self.line();
        let mut depth = 0usize;
        while let Some(token) = self.next() {
            if token == Token::Punct(open) {
                depth += 1;
            } else if token == Token::Punct(close) {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
        }
        Err(compile_error(start_line, &open.to_string(), "unexpected end of file, unbalanced braces"))
    }

    fn skip_statement(&mut self) -> Result<(), String> {
        while let Some(token) = self.peek().cloned() {
            match token {
                Token::Punct(';') => {
                    self.pos += 1;
                    return Ok(());
                }
                Token::Punct('{') => self.skip_group('{', '}')?,
                Token::Punct('(') => self.skip_group('(', ')')?,
                Token::Punct('}') => return Err(self.error("syntax error")),
                _ => self.pos += 1,
            }
        }
        Err(self.error("syntax error, missing ';'"))
    }

    fn array_size(&mut self) -> Result<u32, String> {
        self.expect_punct('[')?;
        let literal = match self.next() {
            Some(Token::Number(n)) => n,
            Some(Token::Ident(name)) => self.defines.get(&name).cloned().unwrap_or(name),
            _ => return Err(self.error("array size must be a constant integer")),
        };
        let size = literal
            .trim_end_matches(['u', 'U'])
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0);
        let Some(size) = size else {
            self.pos -= 1;
            return Err(self.error("array size must be a positive integer"));
        };
        self.expect_punct(']')?;
        Ok(size)
    }

    fn resolve_type(&self, name: &str) -> Option<ShaderType> {
        if let Some(leaf) = UniformType::from_glsl(name) {
            return Some(ShaderType::Leaf(leaf));
        }
        self.structs.get(name).map(|s| ShaderType::Struct(s.clone()))
    }

    /// `name`, `name[N]` and comma lists, up to and including the `;`
    fn declarators(&mut self, base: &ShaderType) -> Result<Vec<(String, ShaderType)>, String> {
        let mut out = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let declared = if self.is_punct('[') {
                ShaderType::array(base.clone(), self.array_size()?)
            } else {
                base.clone()
            };
            out.push((name, declared));
            match self.next() {
                Some(Token::Punct(',')) => continue,
                Some(Token::Punct(';')) => return Ok(out),
                _ => {
                    self.pos -= 1;
                    return Err(self.error("syntax error, expected ',' or ';'"));
                }
            }
        }
    }

    /// Members between braces, the opening brace being the current token
    fn members(&mut self, owner: &str) -> Result<StructType, String> {
        self.expect_punct('{')?;
        let mut struct_type = StructType::new(owner);
        while !self.is_punct('}') {
            if self.peek().is_none() {
                return Err(self.error("unexpected end of file, unbalanced braces"));
            }
            if matches!(self.peek(), Some(Token::Ident(k)) if k == "layout") {
                self.pos += 1;
                self.skip_group('(', ')')?;
            }
            self.skip_precision();
            let type_name = self.expect_ident()?;
            let Some(base) = self.resolve_type(&type_name) else {
                self.pos -= 1;
                return Err(self.error("unknown type"));
            };
            for (name, field_type) in self.declarators(&base)? {
                struct_type = struct_type.with_field(name, field_type);
            }
        }
        self.expect_punct('}')?;
        if struct_type.fields.is_empty() {
            return Err(compile_error(self.line(), owner, "struct or block must have at least one member"));
        }
        Ok(struct_type)
    }

    fn parse_struct(&mut self) -> Result<(), String> {
        self.pos += 1;
        let name = self.expect_ident()?;
        let struct_type = self.members(&name)?;
        self.structs.insert(name, Rc::new(struct_type));
        // trailing variable declarations are not uniforms
        self.skip_statement()
    }

    fn parse_uniform(&mut self) -> Result<(), String> {
        self.pos += 1;
        self.skip_precision();
        let type_name = self.expect_ident()?;

        if self.is_punct('{') {
            if self.version < 300 || !self.tier.is_extended() {
                return Err(self.error("uniform blocks require GLSL ES 3.00"));
            }
            let layout = self.members(&type_name)?;
            let instance = match self.peek() {
                Some(Token::Ident(_)) => Some(self.expect_ident()?),
                _ => None,
            };
            self.expect_punct(';')?;
            self.interface.blocks.push(DeclaredBlock {
                name: type_name,
                instance,
                layout,
            });
            return Ok(());
        }

        let Some(base) = self.resolve_type(&type_name) else {
            self.pos -= 1;
            return Err(self.error("unknown type"));
        };
        let declared = self.declarators(&base)?;
        self.interface.uniforms.extend(declared);
        Ok(())
    }

    /// Function definition, prototype or global variable
    fn parse_other(&mut self) -> Result<(), String> {
        let mut previous: Vec<String> = Vec::new();
        while let Some(token) = self.peek().cloned() {
            match token {
                Token::Punct(';') => {
                    self.pos += 1;
                    return Ok(());
                }
                Token::Punct('(') => {
                    self.skip_group('(', ')')?;
                    if self.is_punct('{') {
                        self.skip_group('{', '}')?;
                        let mut names = previous.iter().rev();
                        if let (Some(name), Some(ret)) = (names.next(), names.next()) {
                            if name == "main" && ret == "void" {
                                self.has_main = true;
                            }
                        }
                        return Ok(());
                    }
                    return self.skip_statement();
                }
                Token::Punct('{') => self.skip_group('{', '}')?,
                Token::Punct('}') => return Err(self.error("syntax error, unbalanced braces")),
                Token::Ident(word) => {
                    previous.push(word);
                    self.pos += 1;
                }
                Token::Number(_) | Token::Punct(_) => self.pos += 1,
            }
        }
        Err(self.error("syntax error"))
    }

    fn parse(mut self) -> Result<ShaderInterface, String> {
        while let Some(token) = self.peek().cloned() {
            match token {
                Token::Punct(';') => self.pos += 1,
                Token::Ident(word) => match word.as_str() {
                    "precision" => self.skip_statement()?,
                    "struct" => self.parse_struct()?,
                    "layout" => {
                        self.pos += 1;
                        self.skip_group('(', ')')?;
                    }
                    "uniform" => self.parse_uniform()?,
                    q if SKIPPED_QUALIFIERS.contains(&q) => self.skip_statement()?,
                    _ => self.parse_other()?,
                },
                _ => return Err(self.error("syntax error")),
            }
        }
        if !self.has_main {
            return Err(compile_error(self.line(), "main", "missing function definition"));
        }
        self.interface.version = self.version;
        Ok(self.interface)
    }
}

/// Read the interface of one shader stage. The error is the info log.
pub fn compile(tier: ContextTier, source: &str) -> Result<ShaderInterface, String> {
    let pre = preprocess(source)?;
    if pre.version == 300 && !tier.is_extended() {
        return Err(compile_error(1, "300", "version not supported by this context"));
    }
    let parser = Parser {
        tokens: &pre.tokens,
        pos: 0,
        tier,
        version: pre.version,
        defines: &pre.defines,
        structs: FxHashMap::default(),
        interface: ShaderInterface::default(),
        has_main: false,
    };
    parser.parse()
}

/// Flatten one declaration into active-uniform entries: struct members get
/// dotted names, arrays of structs are unrolled, leaf arrays are reported
/// once as `name[0]`.
fn flatten(prefix: &str, shader_type: &ShaderType, out: &mut Vec<(String, UniformType, u32)>) {
    match shader_type {
        ShaderType::Leaf(ty) => out.push((prefix.to_string(), *ty, 1)),
        ShaderType::Array(element, len) => match element.as_ref() {
            ShaderType::Leaf(ty) => out.push((format!("{}[0]", prefix), *ty, *len)),
            nested => {
                for i in 0..*len {
                    flatten(&format!("{}[{}]", prefix, i), nested, out);
                }
            }
        },
        ShaderType::Struct(s) => {
            for field in &s.fields {
                flatten(&format!("{}.{}", prefix, field.name), &field.field_type, out);
            }
        }
    }
}

/// Result of linking two stages
#[derive(Debug, Clone, Default)]
pub struct ProgramInterface {
    pub uniforms: Vec<ActiveUniform>,
    pub blocks: Vec<ActiveUniformBlock>,
    /// Declared type of each location
    pub location_types: Vec<UniformType>,
    locations: FxHashMap<String, u32>,
}

impl ProgramInterface {
    /// Location of `name`, `name[0]` or `name[i]`
    pub fn location(&self, name: &str) -> Option<u32> {
        self.locations.get(name).copied()
    }

    /// Every addressable name with its location
    pub fn names(&self) -> impl Iterator<Item = (&str, u32)> {
        self.locations.iter().map(|(name, location)| (name.as_str(), *location))
    }

    fn add_default_uniform(&mut self, name: String, uniform_type: UniformType, size: u32) {
        let base = self.location_types.len() as u32;
        self.location_types.extend(std::iter::repeat(uniform_type).take(size as usize));
        if let Some(stem) = name.strip_suffix("[0]") {
            self.locations.insert(stem.to_string(), base);
            for i in 1..size {
                self.locations.insert(format!("{}[{}]", stem, i), base + i);
            }
        }
        self.locations.insert(name.clone(), base);
        self.uniforms.push(ActiveUniform {
            name,
            uniform_type,
            size,
            block_index: None,
        });
    }
}

/// Merge the interfaces of a vertex and a fragment stage. The error is the
/// program info log.
pub fn link(vertex: &ShaderInterface, fragment: &ShaderInterface) -> Result<ProgramInterface, String> {
    if vertex.version != fragment.version {
        return Err("ERROR: Shader versions of the stages differ\n".to_string());
    }

    let mut declared: Vec<(String, ShaderType)> = Vec::new();
    for (name, shader_type) in vertex.uniforms.iter().chain(&fragment.uniforms) {
        match declared.iter().find(|(n, _)| n == name) {
            Some((_, existing)) if existing != shader_type => {
                return Err(format!("ERROR: Uniform '{}' is declared differently between stages\n", name));
            }
            Some(_) => {}
            None => declared.push((name.clone(), shader_type.clone())),
        }
    }

    let mut blocks: Vec<&DeclaredBlock> = Vec::new();
    for block in vertex.blocks.iter().chain(&fragment.blocks) {
        match blocks.iter().find(|b| b.name == block.name) {
            Some(existing) if existing.layout.fields != block.layout.fields => {
                return Err(format!("ERROR: Uniform block '{}' is declared differently between stages\n", block.name));
            }
            Some(_) => {}
            None => blocks.push(block),
        }
    }

    let mut program = ProgramInterface::default();
    for (name, shader_type) in &declared {
        let mut leaves = Vec::new();
        flatten(name, shader_type, &mut leaves);
        for (leaf_name, ty, size) in leaves {
            program.add_default_uniform(leaf_name, ty, size);
        }
    }

    for (index, block) in blocks.iter().enumerate() {
        let index = index as u32;
        program.blocks.push(ActiveUniformBlock {
            name: block.name.clone(),
            index,
            data_size: block.layout.std140_size(),
        });
        for field in &block.layout.fields {
            let prefix = match &block.instance {
                Some(_) => format!("{}.{}", block.name, field.name),
                None => field.name.clone(),
            };
            let mut leaves = Vec::new();
            flatten(&prefix, &field.field_type, &mut leaves);
            program
                .uniforms
                .extend(leaves.into_iter().map(|(name, uniform_type, size)| ActiveUniform {
                    name,
                    uniform_type,
                    size,
                    block_index: Some(index),
                }));
        }
    }
    Ok(program)
}

#[cfg(test)]
#[path = "headless_shader_tests.rs"]
mod tests;
