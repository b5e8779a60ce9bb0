use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Date32Array, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Days, NaiveDate};
use parquet::arrow::ArrowWriter;
use serde_json::json;

/// Seeded picks for the sample snapshot: one seed always yields the same
/// ISINs, dates and file sizes. xoshiro256**, state filled by an LCG.
struct SampleRng {
    state: [u64; 4],
}

impl SampleRng {
    fn new(seed: u64) -> Self {
        let mut x = seed;
        SampleRng {
            state: std::array::from_fn(|_| {
                x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
                x
            }),
        }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[self.below(items.len())]
    }
}

const COUNTRIES: [&str; 6] = ["FR", "DE", "IT", "ES", "NL", "IE"];
const ISSUERS: [&str; 8] = [
    "Acme Corp", "acme Holdings Ltd", "Borealis SA", "Castellan AG", "Delta Finanza SpA",
    "Equinox NV", "Fjord Capital plc", "Gaia Energía SA",
];
const INSTRUMENT_TYPES: [&str; 5] = ["EQUI", "DEBT", "FUTR", "OPTN", "SWAP"];
const VENUES: [&str; 4] = ["XPAR", "XETR", "XMIL", "XMAD"];

fn day(base: NaiveDate, offset: u64) -> NaiveDate {
    base.checked_add_days(Days::new(offset)).unwrap_or(base)
}

fn isin(rng: &mut SampleRng, country: &str) -> String {
    format!("{country}{:010}", rng.next_u64() % 10_000_000_000)
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

fn write_csv(path: &Path, header: &[&str], rows: &[Vec<String>]) -> Result<()> {
    create_parent(path)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Instrument file written as Parquet: typed columns, some missing values.
fn write_instruments_parquet(path: &Path, rng: &mut SampleRng, base: NaiveDate, n: usize) -> Result<()> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).context("epoch")?;

    let mut isins = Vec::with_capacity(n);
    let mut venues = Vec::with_capacity(n);
    let mut first_trade = Vec::with_capacity(n);
    let mut notional = Vec::with_capacity(n);
    for i in 0..n {
        let country = rng.pick(&COUNTRIES);
        isins.push(isin(rng, country));
        venues.push(rng.pick(&VENUES));
        let traded = day(base, rng.below(365) as u64);
        first_trade.push((i % 7 != 0).then(|| (traded - epoch).num_days() as i32));
        notional.push((i % 5 != 0).then(|| (rng.next_f64() * 1_000_000.0).round() / 100.0));
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("isin", DataType::Utf8, false),
        Field::new("trading_venue", DataType::Utf8, false),
        Field::new("first_trade_date", DataType::Date32, true),
        Field::new("notional", DataType::Float64, true),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(isins)),
            Arc::new(StringArray::from(venues)),
            Arc::new(Date32Array::from(first_trade)),
            Arc::new(Float64Array::from(notional)),
        ],
    )
    .context("building record batch")?;

    create_parent(path)?;
    let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let root: PathBuf = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "data".to_string())
        .into();
    let mut rng = SampleRng::new(42);
    let base = NaiveDate::from_ymd_opt(2024, 1, 2).context("base date")?;

    // ---- MiFID: daily FULINS/DLTINS publications, parquet files ----
    let mut mifid_rows = Vec::new();
    for d in 0..10u64 {
        let published = day(base, d);
        for file_type in ["FULINS", "DLTINS"] {
            let name = format!("{file_type}_{}.parquet", published.format("%Y%m%d"));
            let link = format!("mifid/files/{name}");
            let n = 20 + rng.below(20);
            write_instruments_parquet(&root.join(&link), &mut rng, base, n)?;
            mifid_rows.push(vec![published.to_string(), name, file_type.to_string(), link]);
        }
    }
    write_csv(
        &root.join("mifid/files.csv"),
        &["publication_date", "file_name", "file_type", "download_link"],
        &mifid_rows,
    )?;

    // ---- FIRDS: JSON file list, CSV files per instrument type ----
    let mut firds = Vec::new();
    for (i, instrument_type) in INSTRUMENT_TYPES.iter().enumerate() {
        let published = day(base, i as u64);
        let name = format!("FULINS_{}_{}.csv", instrument_type.chars().next().unwrap_or('X'), published.format("%Y%m%d"));
        let link = format!("firds/files/{name}");
        let rows: Vec<Vec<String>> = (0..25)
            .map(|_| {
                let country = rng.pick(&COUNTRIES);
                vec![
                    isin(&mut rng, country),
                    instrument_type.to_string(),
                    rng.pick(&VENUES).to_string(),
                    day(base, rng.below(90) as u64).to_string(),
                ]
            })
            .collect();
        write_csv(
            &root.join(&link),
            &["isin", "instrument_type", "trading_venue", "admission_date"],
            &rows,
        )?;
        firds.push(json!({
            "file_name": name,
            "instrument_type": instrument_type,
            "publication_date": published.to_string(),
            "download_link": link,
        }));
    }
    let firds_path = root.join("firds/files.json");
    create_parent(&firds_path)?;
    std::fs::write(&firds_path, serde_json::to_string_pretty(&firds)?)
        .with_context(|| format!("writing {}", firds_path.display()))?;

    // ---- SSR: exempted shares reference list ----
    let ssr_rows: Vec<Vec<String>> = (0..40)
        .map(|i| {
            let issuer = ISSUERS[i % ISSUERS.len()];
            let country = rng.pick(&COUNTRIES);
            let start = if i % 9 == 0 {
                String::new()
            } else {
                day(base, rng.below(720) as u64).to_string()
            };
            vec![issuer.to_string(), isin(&mut rng, country), country.to_string(), start]
        })
        .collect();
    write_csv(
        &root.join("ssr/reference.csv"),
        &["issuer_name", "isin", "country_code", "exemption_start_date"],
        &ssr_rows,
    )?;

    println!(
        "Wrote {} MiFID files, {} FIRDS files and {} SSR rows under {}",
        mifid_rows.len(),
        firds.len(),
        ssr_rows.len(),
        root.display()
    );
    Ok(())
}
