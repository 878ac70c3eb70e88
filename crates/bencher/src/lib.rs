#[derive(Debug, Clone)]
pub struct TestCase {
    name: &'static str,
    group: TestGroup,
    input: TestInput,
}

impl TestCase {
    pub fn new(name: &'static str, group: TestGroup, input: TestInput) -> Self {
        Self { name, group, input }
    }

    pub fn small(name: &'static str, input: TestInput) -> Self {
        Self::new(name, TestGroup::Small, input)
    }

    pub fn normal(name: &'static str, input: TestInput) -> Self {
        Self::new(name, TestGroup::Normal, input)
    }

    pub fn large(name: &'static str, input: TestInput) -> Self {
        Self::new(name, TestGroup::Large, input)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> TestGroup {
        self.group
    }

    pub fn input(&self) -> &TestInput {
        &self.input
    }

    pub fn bytes(&self) -> &[u8] {
        self.input.bytes()
    }
}

/// Wire bytes fed to a decoder, either a fixed fixture or built at setup.
#[derive(Debug, Clone)]
pub struct TestInput {
    description: &'static str,
    bytes: Vec<u8>,
}

impl TestInput {
    pub fn new(description: &'static str, bytes: impl Into<Vec<u8>>) -> Self {
        Self { description, bytes: bytes.into() }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Clone, Copy, Debug)]
pub enum TestGroup {
    Small,
    Normal,
    Large,
}
