use std::fmt;

/// Version of the class file, which is used to verify that the JVM has the
/// necessary features to interpret the class
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    pub major_version: u16,
    pub minor_version: u16,
}

impl Version {
    pub const JAVA1_1: Version = Version::new(45, 3);
    pub const JAVA1_2: Version = Version::new(46, 0);
    pub const JAVA1_3: Version = Version::new(47, 0);
    pub const JAVA1_4: Version = Version::new(48, 0);
    pub const JAVA5: Version = Version::new(49, 0);
    pub const JAVA6: Version = Version::new(50, 0);
    pub const JAVA7: Version = Version::new(51, 0);

    /// JVM class file version corresponding to Java SE 8 (released March 2014)
    pub const JAVA8: Version = Version::new(52, 0);
    pub const JAVA9: Version = Version::new(53, 0);
    pub const JAVA11: Version = Version::new(55, 0);
    pub const JAVA17: Version = Version::new(61, 0);
    pub const JAVA21: Version = Version::new(65, 0);

    /// Newest major version the reader accepts
    pub const MAX_SUPPORTED_MAJOR: u16 = 65;

    pub const fn new(major_version: u16, minor_version: u16) -> Version {
        Version {
            major_version,
            minor_version,
        }
    }

    /// Does this version use the (compressed) `StackMapTable` attribute?
    ///
    /// Older class files can only carry the uncompressed `StackMap` form.
    pub fn has_stack_map_table(&self) -> bool {
        self.major_version >= Version::JAVA6.major_version
    }

    /// Does this version understand the `ACC_SYNTHETIC` flag (as opposed to the `Synthetic`
    /// attribute)?
    pub fn has_synthetic_flag(&self) -> bool {
        self.major_version >= Version::JAVA5.major_version
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major_version, self.minor_version)
    }
}
