//! Minimal PDB reader for chain sequences.
//!
//! Reads `ATOM`/`HETATM` records of the first model, groups atoms into
//! residues per chain, and splits each chain into peptides wherever two
//! consecutive standard residues are not bonded (C–N distance above
//! [`PEPTIDE_BOND_MAX`]) or a non-standard residue interrupts the chain.

use std::collections::HashMap;

use crate::domain::{EvalError, Result};

/// Maximum C(i)–N(i+1) distance in Ångström for residues to be bonded.
pub const PEPTIDE_BOND_MAX: f64 = 1.8;

/// One-letter code for the 20 standard amino acids and selenomethionine.
pub fn one_letter(residue_name: &str) -> Option<char> {
    let code = match residue_name {
        "ALA" => 'A',
        "ARG" => 'R',
        "ASN" => 'N',
        "ASP" => 'D',
        "CYS" => 'C',
        "GLN" => 'Q',
        "GLU" => 'E',
        "GLY" => 'G',
        "HIS" => 'H',
        "ILE" => 'I',
        "LEU" => 'L',
        "LYS" => 'K',
        "MET" | "MSE" => 'M',
        "PHE" => 'F',
        "PRO" => 'P',
        "SER" => 'S',
        "THR" => 'T',
        "TRP" => 'W',
        "TYR" => 'Y',
        "VAL" => 'V',
        _ => return None,
    };
    Some(code)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PdbResidue {
    pub name: String,
    pub seq: i32,
    pub insertion: Option<char>,
    atoms: HashMap<String, [f64; 3]>,
}

impl PdbResidue {
    pub fn atom(&self, name: &str) -> Option<[f64; 3]> {
        self.atoms.get(name).copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PdbChain {
    pub id: char,
    pub residues: Vec<PdbResidue>,
}

impl PdbChain {
    /// Sequences of the bonded peptide segments, in residue order.
    pub fn peptides(&self) -> Vec<String> {
        let mut peptides = Vec::new();
        let mut current = String::new();
        let mut prev: Option<&PdbResidue> = None;

        for residue in &self.residues {
            let Some(code) = one_letter(&residue.name) else {
                if !current.is_empty() {
                    peptides.push(std::mem::take(&mut current));
                }
                prev = None;
                continue;
            };
            if let Some(p) = prev {
                if !is_bonded(p, residue) {
                    peptides.push(std::mem::take(&mut current));
                }
            }
            current.push(code);
            prev = Some(residue);
        }
        if !current.is_empty() {
            peptides.push(current);
        }
        peptides
    }

    /// First peptide segment, if the chain has any standard residues.
    pub fn first_peptide(&self) -> Option<String> {
        self.peptides().into_iter().next()
    }
}

fn is_bonded(prev: &PdbResidue, next: &PdbResidue) -> bool {
    match (prev.atom("C"), next.atom("N")) {
        (Some(c), Some(n)) => {
            let d2: f64 = c.iter().zip(n.iter()).map(|(a, b)| (a - b).powi(2)).sum();
            d2.sqrt() <= PEPTIDE_BOND_MAX
        }
        _ => false,
    }
}

/// Chains of the first model in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdbStructure {
    pub chains: Vec<PdbChain>,
}

impl PdbStructure {
    pub fn chain(&self, id: char) -> Option<&PdbChain> {
        self.chains.iter().find(|c| c.id == id)
    }
}

fn field(line: &str, range: std::ops::Range<usize>) -> &str {
    line.get(range).map(str::trim).unwrap_or("")
}

fn coord(line: &str, range: std::ops::Range<usize>, line_no: usize) -> Result<f64> {
    let raw = field(line, range);
    raw.parse::<f64>().map_err(|_| {
        EvalError::Structure(format!("line {line_no}: invalid coordinate {raw:?}"))
    })
}

/// Parse PDB text.
pub fn parse_pdb(text: &str) -> Result<PdbStructure> {
    let mut structure = PdbStructure::default();
    let mut chain_index: HashMap<char, usize> = HashMap::new();
    let mut seen_model = false;

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let record = line.get(0..6).unwrap_or(line).trim_end();
        match record {
            "MODEL" => {
                if seen_model {
                    break;
                }
                seen_model = true;
                continue;
            }
            "ENDMDL" | "END" => break,
            "ATOM" | "HETATM" => {}
            _ => continue,
        }

        let alt_loc = line.get(16..17).unwrap_or(" ");
        if !matches!(alt_loc, " " | "A") {
            continue;
        }

        let atom_name = field(line, 12..16).to_string();
        let residue_name = field(line, 17..20).to_string();
        let chain_id = line.get(21..22).and_then(|s| s.chars().next()).unwrap_or(' ');
        let seq_raw = field(line, 22..26);
        let seq: i32 = seq_raw.parse().map_err(|_| {
            EvalError::Structure(format!("line {line_no}: invalid residue number {seq_raw:?}"))
        })?;
        let insertion = line
            .get(26..27)
            .and_then(|s| s.chars().next())
            .filter(|c| !c.is_whitespace());
        let xyz = [
            coord(line, 30..38, line_no)?,
            coord(line, 38..46, line_no)?,
            coord(line, 46..54, line_no)?,
        ];

        let ci = *chain_index.entry(chain_id).or_insert_with(|| {
            structure.chains.push(PdbChain {
                id: chain_id,
                residues: Vec::new(),
            });
            structure.chains.len() - 1
        });
        let chain = &mut structure.chains[ci];
        let same_residue = chain.residues.last().is_some_and(|r| {
            r.seq == seq && r.insertion == insertion && r.name == residue_name
        });
        if !same_residue {
            chain.residues.push(PdbResidue {
                name: residue_name,
                seq,
                insertion,
                atoms: HashMap::new(),
            });
        }
        if let Some(residue) = chain.residues.last_mut() {
            residue.atoms.entry(atom_name).or_insert(xyz);
        }
    }
    Ok(structure)
}
