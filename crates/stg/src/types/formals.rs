/// Name bound to each element when mapping a template without declared
/// parameters, and the default parameter of anonymous subtemplates.
pub const ITERATION_PARAMETER: &str = "it";

/// 1-based and 0-based iteration indexes, set on every mapped instance and
/// always in scope.
pub const IMPLICIT_ATTRIBUTES: [&str; 2] = ["i", "i0"];

/// A declared template parameter with an optional default.
///
/// The default is expression source (for example `"\"none\""`, `true`, or
/// `{<it>!}`) evaluated in the callee's own scope when the caller does not
/// supply the parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormalParameter {
    pub name: String,
    pub default: Option<String>,
}

impl FormalParameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn with_default(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: Some(default.into()),
        }
    }
}

/// The parameter list of a template.
///
/// `Open` templates accept any attribute name and are not checked at compile
/// time. `Declared` templates reject references to names outside the list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Formals {
    #[default]
    Open,
    Declared(Vec<FormalParameter>),
}

impl Formals {
    /// Declared parameters without defaults.
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Formals::Declared(names.into_iter().map(FormalParameter::new).collect())
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Formals::Open)
    }

    /// Declared parameters, in order. Open templates have none.
    pub fn parameters(&self) -> &[FormalParameter] {
        match self {
            Formals::Open => &[],
            Formals::Declared(params) => params,
        }
    }

    pub fn get(&self, name: &str) -> Option<&FormalParameter> {
        self.parameters().iter().find(|p| p.name == name)
    }

    /// Whether a reference to `name` is legal inside the template.
    pub fn accepts(&self, name: &str) -> bool {
        match self {
            Formals::Open => true,
            Formals::Declared(params) => {
                IMPLICIT_ATTRIBUTES.contains(&name) || params.iter().any(|p| p.name == name)
            }
        }
    }

    /// The first parameter name declared more than once, if any.
    pub fn duplicate(&self) -> Option<&str> {
        let params = self.parameters();
        params
            .iter()
            .enumerate()
            .find(|(i, p)| params[..*i].iter().any(|q| q.name == p.name))
            .map(|(_, p)| p.name.as_str())
    }

    /// Number of declared parameters.
    pub fn len(&self) -> usize {
        self.parameters().len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters().is_empty()
    }
}

impl From<Vec<FormalParameter>> for Formals {
    fn from(params: Vec<FormalParameter>) -> Self {
        Formals::Declared(params)
    }
}

impl From<&[&str]> for Formals {
    fn from(names: &[&str]) -> Self {
        Formals::names(names.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for Formals {
    fn from(names: [&str; N]) -> Self {
        Formals::names(names)
    }
}
