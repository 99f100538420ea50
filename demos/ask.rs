use chrono::NaiveDate;
use dotenv::dotenv;
use ledger_assistant::*;
use rust_decimal_macros::dec;
use std::io::{self, Write};
use std::sync::Arc;

const TENANT: &str = "demo";

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn seed() -> TenantData {
    TenantData {
        groups: vec![
            Group {
                id: 1,
                name: "Receitas de Serviços".to_string(),
            },
            Group {
                id: 2,
                name: "Custos Operacionais".to_string(),
            },
            Group {
                id: 3,
                name: "Despesas Administrativas".to_string(),
            },
        ],
        subgroups: vec![Subgroup {
            id: 10,
            group_id: 3,
            name: "Aluguel".to_string(),
        }],
        ledger: vec![
            LedgerEntry::new(d(2024, 9, 4), "Evento corporativo", dec!(8200), Direction::Entrada)
                .with_group(1)
                .from_bank("Itaú"),
            LedgerEntry::new(d(2024, 9, 20), "Equipe freelancer", dec!(2900), Direction::Saida)
                .with_group(2)
                .from_bank("Itaú"),
            LedgerEntry::new(d(2024, 10, 2), "Casamento Silva", dec!(12500), Direction::Entrada)
                .with_group(1)
                .from_bank("Itaú"),
            LedgerEntry::new(d(2024, 10, 5), "Aluguel galpão", dec!(3500), Direction::Saida)
                .with_subgroup(3, 10)
                .from_bank("Itaú"),
            LedgerEntry::new(d(2024, 10, 18), "Combustível", dec!(640), Direction::Saida)
                .with_category("Transporte"),
        ],
        receivables: vec![Title::new("Formatura ABC", d(2024, 12, 5), dec!(6000))],
        payables: vec![Title::new("Locadora de som", d(2024, 11, 28), dec!(1800)).with_group(2)],
        contracts: vec![Contract {
            counterparty: "Formatura ABC".to_string(),
            contract_start: d(2024, 8, 1),
            event_date: d(2024, 12, 14),
            service_value: dec!(18000),
            displacement_value: dec!(900),
            status: ContractStatus::EmAndamento,
        }],
        investments: vec![Investment {
            name: "CDB liquidez diária".to_string(),
            institution: Some("Itaú".to_string()),
            balance: dec!(15000),
            as_of: d(2024, 10, 31),
        }],
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = ProviderConfig::from_env()?;
    println!("Using {} ({})", config.provider.as_str(), config.model);

    let gateway = InMemoryGateway::new()
        .with_tenant(TENANT, seed())?
        .with_provider(config);
    let assistant = FinancialAssistant::new(Arc::new(gateway)).with_today(d(2024, 11, 15));

    println!("Pergunte sobre as finanças da empresa (\"sair\" para encerrar).");
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let question = input.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("sair") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        match assistant.ask(TENANT, question).await {
            Ok(answer) => {
                println!(
                    "\n[{} | {} a {}]\n",
                    answer.result_bundle.result.type_tag(),
                    answer.plan.period.start,
                    answer.plan.period.end
                );
                println!("{}\n", answer.markdown);
                for chart in &answer.chart_series {
                    println!("  chart {} ({:?}): {} labels", chart.id, chart.kind, chart.labels.len());
                }
                for warning in &answer.warnings {
                    println!("  warning: {}", warning);
                }
            }
            Err(err) => println!("Erro ({:?}): {}", err.kind(), err),
        }
    }

    Ok(())
}
