use recbench_lib::sampler::{Operation, OperationRates};

/// Parse an operation mix such as `c=20,r=60,u=10,d=5,p=5`.
///
/// Keys are the operation names or their first letter,
/// omitted operations get a rate of zero.
/// Whether the rates sum up to 100 is checked when the run config is built.
pub fn parse_operation_mix(input: &str) -> Result<OperationRates, String> {
    let mut rates: [Option<u32>; 5] = [None; 5];

    for part in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let Some((key, value)) = part.split_once('=') else {
            return Err(format!("invalid mix entry '{part}': expected <operation>=<rate>"));
        };

        let op = match key.trim().to_ascii_lowercase().as_str() {
            "c" | "create" => Operation::Create,
            "r" | "read" => Operation::Read,
            "u" | "update" => Operation::Update,
            "d" | "delete" => Operation::Delete,
            "p" | "ping" => Operation::Ping,
            other => return Err(format!("unknown operation '{other}' in mix")),
        };

        let rate: u32 = value
            .trim()
            .parse()
            .map_err(|err| format!("invalid rate for {op} in mix: '{value}': {err}"))?;

        let slot = &mut rates[Operation::ALL
            .iter()
            .position(|candidate| *candidate == op)
            .unwrap_or_default()];
        if slot.replace(rate).is_some() {
            return Err(format!("operation {op} defined more than once in mix"));
        }
    }

    if rates.iter().all(Option::is_none) {
        return Err("empty operation mix".to_owned());
    }

    let [create, read, update, delete, ping] = rates.map(Option::unwrap_or_default);
    Ok(OperationRates::new(create, read, update, delete, ping))
}
