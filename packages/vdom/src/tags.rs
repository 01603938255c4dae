use std::fmt;

/// The verb tags the interpreter executes, plus foreign (output) elements.
///
/// Foreign elements - `span`, `div`, anything not in the verb list - are
/// materialized into the output DOM by a shared ops implementation instead
/// of carrying their own semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagName {
    Hvml,
    Head,
    Body,
    Init,
    Observe,
    Match,
    Test,
    Differ,
    Catch,
    Inherit,
    Iterate,
    Choose,
    Except,
    Exit,
    Forget,
    Update,
    Load,
    Define,
    Back,
    Call,
    Include,
    Reduce,
    Sort,
    Bind,
    Archetype,
    Foreign(Box<str>),
}

impl TagName {
    pub fn from_tag(name: &str) -> TagName {
        match name {
            "hvml" => TagName::Hvml,
            "head" => TagName::Head,
            "body" => TagName::Body,
            "init" => TagName::Init,
            "observe" => TagName::Observe,
            "match" => TagName::Match,
            "test" => TagName::Test,
            "differ" => TagName::Differ,
            "catch" => TagName::Catch,
            "inherit" => TagName::Inherit,
            "iterate" => TagName::Iterate,
            "choose" => TagName::Choose,
            "except" => TagName::Except,
            "exit" => TagName::Exit,
            "forget" => TagName::Forget,
            "update" => TagName::Update,
            "load" => TagName::Load,
            "define" => TagName::Define,
            "back" => TagName::Back,
            "call" => TagName::Call,
            "include" => TagName::Include,
            "reduce" => TagName::Reduce,
            "sort" => TagName::Sort,
            "bind" => TagName::Bind,
            "archetype" => TagName::Archetype,
            other => TagName::Foreign(other.into()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TagName::Hvml => "hvml",
            TagName::Head => "head",
            TagName::Body => "body",
            TagName::Init => "init",
            TagName::Observe => "observe",
            TagName::Match => "match",
            TagName::Test => "test",
            TagName::Differ => "differ",
            TagName::Catch => "catch",
            TagName::Inherit => "inherit",
            TagName::Iterate => "iterate",
            TagName::Choose => "choose",
            TagName::Except => "except",
            TagName::Exit => "exit",
            TagName::Forget => "forget",
            TagName::Update => "update",
            TagName::Load => "load",
            TagName::Define => "define",
            TagName::Back => "back",
            TagName::Call => "call",
            TagName::Include => "include",
            TagName::Reduce => "reduce",
            TagName::Sort => "sort",
            TagName::Bind => "bind",
            TagName::Archetype => "archetype",
            TagName::Foreign(name) => name,
        }
    }

    pub fn is_foreign(&self) -> bool {
        matches!(self, TagName::Foreign(_))
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute assignment operators.
///
/// `=` replaces, `+=`/`-=`/`%=` are numeric, `~=` is regex replace, `^=`
/// prepends, `$=` appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    Replace,
    Add,
    Subtract,
    Remainder,
    RegexReplace,
    Prepend,
    Append,
}

impl AttrOp {
    pub fn token(&self) -> &'static str {
        match self {
            AttrOp::Replace => "=",
            AttrOp::Add => "+=",
            AttrOp::Subtract => "-=",
            AttrOp::Remainder => "%=",
            AttrOp::RegexReplace => "~=",
            AttrOp::Prepend => "^=",
            AttrOp::Append => "$=",
        }
    }
}
