use dotenv::dotenv;
use ledger_assistant::*;
use std::env;
use std::sync::Arc;

const SAMPLE: &str = "\
Data;Histórico;Valor
02/01/2024;PIX RECEBIDO - CLIENTE ABC;1.250,00
05/01/2024;TARIFA PACOTE SERVICOS;-39,90
08/01/2024;PAGAMENTO BOLETO - ENERGIA;-312,47
15/01/2024;TED RECEBIDA - FORMATURA XYZ;4.800,00
";

fn read_table(text: &str) -> anyhow::Result<RowTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(text.as_bytes());
    let columns = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok(RowTable::new(columns, rows))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let (text, origin) = match env::args().nth(1) {
        Some(path) => (std::fs::read_to_string(&path)?, path),
        None => (SAMPLE.to_string(), "amostra.csv".to_string()),
    };
    let import_type = env::args()
        .nth(2)
        .and_then(|tag| ImportType::from_tag(&tag))
        .unwrap_or(ImportType::Extrato);

    let table = read_table(&text)?;
    println!("Read {} rows from {}", table.rows.len(), origin);

    let gateway = InMemoryGateway::new().with_provider(ProviderConfig::from_env()?);
    let assistant = FinancialAssistant::new(Arc::new(gateway));
    let outcome = assistant.extract("demo", import_type, &table, None).await?;

    println!(
        "Extracted {} of {} rows ({} skipped, {} dates taken from the file){}",
        outcome.summary.extracted,
        outcome.summary.input_rows,
        outcome.summary.skipped,
        outcome.summary.date_overrides,
        if outcome.is_partial() { " [partial]" } else { "" }
    );
    for row in &outcome.rows {
        println!(
            "  #{:<3} {} {:<7} {:>12} {}",
            row.original_row,
            row.date,
            row.direction.as_str(),
            row.value,
            row.description
        );
    }
    for issue in &outcome.issues {
        println!("  issue {:?} (row {:?}): {}", issue.kind, issue.original_row, issue.message);
    }

    let entries = outcome.ledger_entries(Some(&origin));
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}
