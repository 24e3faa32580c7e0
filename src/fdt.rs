// SPDX-License-Identifier: GPL-3.0-or-later

//! Hardware description tree handed to the guest.
//!
//! Nodes are plain owned records. Devices describe themselves by building a
//! node and appending it to a parent. `Display` renders DTS source; producing
//! a binary blob is left to whoever boots the guest.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
    Empty,
    U32(u32),
    Str(String),
    // Rendered with #address-cells = 2, #size-cells = 2
    Reg { addr: u64, size: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FdtNode {
    pub name: String,
    pub props: Vec<(String, Property)>,
    pub children: Vec<FdtNode>,
}

impl FdtNode {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), ..Self::default() }
    }

    /// Node with a unit address, e.g. `rtc@101000`.
    pub fn new_reg(name: &str, addr: u64) -> Self {
        Self::new(&format!("{}@{:x}", name, addr))
    }

    fn set_prop(&mut self, name: &str, value: Property) {
        match self.props.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => self.props.push((name.to_string(), value)),
        }
    }

    pub fn add_prop_empty(&mut self, name: &str) {
        self.set_prop(name, Property::Empty);
    }

    pub fn add_prop_u32(&mut self, name: &str, value: u32) {
        self.set_prop(name, Property::U32(value));
    }

    pub fn add_prop_str(&mut self, name: &str, value: &str) {
        self.set_prop(name, Property::Str(value.to_string()));
    }

    pub fn add_prop_reg(&mut self, name: &str, addr: u64, size: u64) {
        self.set_prop(name, Property::Reg { addr, size });
    }

    pub fn add_child(&mut self, child: FdtNode) {
        self.children.push(child);
    }

    pub fn prop(&self, name: &str) -> Option<&Property> {
        self.props.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn prop_u32(&self, name: &str) -> Option<u32> {
        match self.prop(name) {
            Some(Property::U32(v)) => Some(*v),
            _ => None,
        }
    }

    /// Direct child with exactly this name.
    pub fn find(&self, name: &str) -> Option<&FdtNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut FdtNode> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    fn matches_reg_any(&self, name: &str) -> bool {
        match self.name.strip_prefix(name) {
            Some(rest) => rest.is_empty() || rest.starts_with('@'),
            None => false,
        }
    }

    /// Direct child named `name` with any (or no) unit address.
    pub fn find_reg_any(&self, name: &str) -> Option<&FdtNode> {
        self.children.iter().find(|c| c.matches_reg_any(name))
    }

    pub fn find_reg_any_mut(&mut self, name: &str) -> Option<&mut FdtNode> {
        self.children.iter_mut().find(|c| c.matches_reg_any(name))
    }

    /// Returns the node's phandle, assigning one on first use.
    pub fn phandle(&mut self, phandles: &mut PhandleAllocator) -> u32 {
        if let Some(phandle) = self.prop_u32("phandle") {
            return phandle;
        }
        let phandle = phandles.alloc();
        self.add_prop_u32("phandle", phandle);
        phandle
    }

    fn fmt_indent(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "\t".repeat(depth);
        let name = if depth == 0 && self.name.is_empty() { "/" } else { self.name.as_str() };
        writeln!(f, "{}{} {{", indent, name)?;
        for (name, value) in &self.props {
            match value {
                Property::Empty => writeln!(f, "{}\t{};", indent, name)?,
                Property::U32(v) => writeln!(f, "{}\t{} = <0x{:x}>;", indent, name, v)?,
                Property::Str(s) => writeln!(f, "{}\t{} = \"{}\";", indent, name, s)?,
                Property::Reg { addr, size } => writeln!(f, "{}\t{} = <0x{:x} 0x{:x} 0x{:x} 0x{:x}>;",
                    indent, name, addr >> 32, *addr as u32, size >> 32, *size as u32)?,
            }
        }
        for child in &self.children {
            writeln!(f)?;
            child.fmt_indent(f, depth + 1)?;
        }
        writeln!(f, "{}}};", indent)
    }
}

impl fmt::Display for FdtNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indent(f, 0)
    }
}

#[derive(Debug)]
pub struct PhandleAllocator {
    next: u32,
}

impl Default for PhandleAllocator {
    fn default() -> Self {
        // phandle 0 is invalid
        Self { next: 1 }
    }
}

impl PhandleAllocator {
    pub fn alloc(&mut self) -> u32 {
        let phandle = self.next;
        self.next += 1;
        phandle
    }
}

/// A description tree with its phandle space.
#[derive(Debug, Default)]
pub struct Fdt {
    pub root: FdtNode,
    pub phandles: PhandleAllocator,
}

impl Fdt {
    /// Root with an empty `soc` bus, the usual parent of MMIO devices.
    pub fn with_soc() -> Self {
        let mut root = FdtNode::new("");
        root.add_prop_u32("#address-cells", 2);
        root.add_prop_u32("#size-cells", 2);

        let mut soc = FdtNode::new("soc");
        soc.add_prop_u32("#address-cells", 2);
        soc.add_prop_u32("#size-cells", 2);
        soc.add_prop_str("compatible", "simple-bus");
        soc.add_prop_empty("ranges");
        root.add_child(soc);

        Self { root, ..Self::default() }
    }
}

impl fmt::Display for Fdt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "/dts-v1/;")?;
        writeln!(f)?;
        write!(f, "{}", self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_reg_any_matches_unit_address() {
        let mut soc = FdtNode::new("soc");
        soc.add_child(FdtNode::new_reg("plic", 0xc00_0000));
        soc.add_child(FdtNode::new("plicx"));
        assert_eq!(soc.find_reg_any("plic").unwrap().name, "plic@c000000");
        assert!(soc.find_reg_any("pli").is_none());
        assert!(soc.find("plic").is_none());
    }

    #[test]
    fn test_phandle_assigned_once() {
        let mut phandles = PhandleAllocator::default();
        let mut a = FdtNode::new("a");
        let mut b = FdtNode::new("b");
        assert_eq!(a.phandle(&mut phandles), 1);
        assert_eq!(b.phandle(&mut phandles), 2);
        assert_eq!(a.phandle(&mut phandles), 1);
        assert_eq!(a.prop_u32("phandle"), Some(1));
    }

    #[test]
    fn test_set_prop_replaces() {
        let mut n = FdtNode::new("n");
        n.add_prop_u32("interrupts", 1);
        n.add_prop_u32("interrupts", 2);
        assert_eq!(n.props.len(), 1);
        assert_eq!(n.prop_u32("interrupts"), Some(2));
    }

    #[test]
    fn test_render_dts() {
        let mut fdt = Fdt::with_soc();
        let mut dev = FdtNode::new_reg("dev", 0x1_0000_1000);
        dev.add_prop_reg("reg", 0x1_0000_1000, 0x20);
        dev.add_prop_str("compatible", "vendor,dev");
        fdt.root.find_mut("soc").unwrap().add_child(dev);

        let dts = fdt.to_string();
        assert!(dts.starts_with("/dts-v1/;\n\n/ {\n"));
        assert!(dts.contains("\t\tdev@100001000 {\n"));
        assert!(dts.contains("\t\t\treg = <0x1 0x1000 0x0 0x20>;\n"));
        assert!(dts.contains("\t\t\tcompatible = \"vendor,dev\";\n"));
        assert!(dts.contains("\t\tranges;\n"));
    }
}
