//! Default sectors and demo startups loaded on first run.

use super::types::{startup_id, StartupRecord};

pub const SECTORS: [&str; 5] = [
    "Artificial Intelligence",
    "Quantum Computing",
    "Biotechnology",
    "Renewable Energy",
    "Nanotechnology",
];

pub struct SeedStartup {
    pub name: &'static str,
    pub description: &'static str,
    pub sector: &'static str,
    pub sub_sector: &'static str,
    pub funding: f64,
    pub technology: &'static str,
}

impl SeedStartup {
    pub fn record(&self, now: i64) -> StartupRecord {
        StartupRecord {
            id: startup_id(self.name),
            name: self.name.to_string(),
            description: self.description.to_string(),
            sector: self.sector.to_string(),
            sub_sector: self.sub_sector.to_string(),
            funding: Some(self.funding),
            technology: self.technology.to_string(),
            updated_at: now,
        }
    }
}

const fn startup(
    name: &'static str,
    description: &'static str,
    sector: &'static str,
    sub_sector: &'static str,
    funding: f64,
    technology: &'static str,
) -> SeedStartup {
    SeedStartup {
        name,
        description,
        sector,
        sub_sector,
        funding,
        technology,
    }
}

pub const STARTUPS: [SeedStartup; 9] = [
    startup("SolarTech", "Solar panel manufacturer", "Renewable Energy", "Solar Energy", 1_000_000.0, "Advanced photovoltaic cells"),
    startup("WindPower", "Wind turbine developer", "Renewable Energy", "Wind Energy", 2_000_000.0, "High-efficiency turbine blades"),
    startup("HydroFlow", "Hydroelectric solutions provider", "Renewable Energy", "Hydropower", 1_500_000.0, "Micro-hydro generators"),
    startup("BioFuel Innovations", "Biofuel research and production", "Renewable Energy", "Bioenergy", 3_000_000.0, "Algae-based biofuels"),
    startup("GeoTherm Solutions", "Geothermal energy systems", "Renewable Energy", "Geothermal Energy", 2_500_000.0, "Deep drilling techniques"),
    startup("AI Assistant", "AI-powered virtual assistant", "Artificial Intelligence", "Natural Language Processing", 5_000_000.0, "Advanced language models"),
    startup("QuantumBit", "Quantum computing hardware", "Quantum Computing", "Quantum Hardware", 10_000_000.0, "Superconducting qubits"),
    startup("BioGene", "Gene therapy solutions", "Biotechnology", "Genetic Engineering", 7_000_000.0, "CRISPR-Cas9 gene editing"),
    startup("NanoMed", "Nanoparticle drug delivery", "Nanotechnology", "Nanomedicine", 4_000_000.0, "Targeted drug delivery systems"),
];
