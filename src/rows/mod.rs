use crate::fotos::Fotos;
use crate::models::{Agrupacion, AmbitoScope, ResultRow};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Truncate to two decimals without rounding, matching the upstream contract.
pub fn trunc_2(x: f64) -> String {
    let trunc = (x.abs() * 100.0).floor() / 100.0;
    let val = if x < 0.0 { -trunc } else { trunc };
    format!("{val:.2}")
}

/// Flatten one results payload into ranked rows for a single scope/category.
/// Groupings are ordered by vote percentage descending (stable, so ties keep
/// upstream order), deduplicated by id-or-name, and numbered 1..N.
pub fn flatten_resultados(
    scope: &AmbitoScope,
    categoria: &str,
    agrupaciones: &[Agrupacion],
    mesas_pct: f64,
    fotos: &Fotos,
    ts_iso: &str,
) -> Vec<ResultRow> {
    let mut ordered: Vec<&Agrupacion> = agrupaciones.iter().collect();
    ordered.sort_by(|a, b| b.pct().partial_cmp(&a.pct()).unwrap_or(Ordering::Equal));

    let mesas = trunc_2(mesas_pct);
    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(ordered.len());
    let mut puesto = 0u32;
    for ag in ordered {
        let id = ag.id();
        let nombre = ag.nombre();
        let unique = if id.is_empty() { nombre.clone() } else { id.clone() };
        if unique.is_empty() || !seen.insert(unique) {
            continue;
        }
        puesto += 1;
        let foto = fotos.resolve(&nombre, &id);
        rows.push(ResultRow {
            ambito: scope.ambito().to_string(),
            ambito_id: scope.ambito_id().to_string(),
            provincia: scope.provincia().to_string(),
            categoria: categoria.to_string(),
            puesto,
            agrupacion_id: id,
            agrupacion: nombre,
            votos_pct: trunc_2(ag.pct()),
            mesas_pct: mesas.clone(),
            foto,
            ts_iso: ts_iso.to_string(),
        });
    }
    rows
}

/// Sanity checks on one flattened group; findings go to the cycle log.
pub fn validate_group(ambito_key: &str, rows: &[ResultRow]) -> Vec<String> {
    let mut warnings = Vec::new();
    let total: f64 = rows
        .iter()
        .filter_map(|r| r.votos_pct.parse::<f64>().ok())
        .sum();
    if total > 100.01 {
        warnings.push(format!("{ambito_key}: votos_pct sum {total:.2} exceeds 100"));
    }
    let mut seen_ids = HashSet::new();
    for r in rows {
        if !r.agrupacion_id.is_empty() && !seen_ids.insert(r.agrupacion_id.as_str()) {
            warnings.push(format!(
                "{ambito_key}: duplicate agrupacion_id {}",
                r.agrupacion_id
            ));
            break;
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::abbrev_categoria;
    use serde_json::json;
    use std::collections::HashMap;

    fn fotos() -> Fotos {
        Fotos::new(HashMap::new(), String::new(), "N/A".to_string())
    }

    fn agrupaciones(entries: &[(&str, &str, f64)]) -> Vec<Agrupacion> {
        entries
            .iter()
            .map(|(id, nombre, pct)| {
                serde_json::from_value(json!({
                    "idAgrupacion": id,
                    "nombreAgrupacion": nombre,
                    "votosPorcentaje": pct,
                }))
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn truncates_without_rounding() {
        assert_eq!(trunc_2(29.999), "29.99");
        assert_eq!(trunc_2(40.0), "40.00");
        assert_eq!(trunc_2(0.005), "0.00");
        assert_eq!(trunc_2(-1.238), "-1.23");
    }

    #[test]
    fn puesto_is_a_permutation_by_descending_pct() {
        let ags = agrupaciones(&[
            ("001", "Lista A", 12.5),
            ("002", "Lista B", 45.0),
            ("003", "Lista C", 30.25),
        ]);
        let rows = flatten_resultados(&AmbitoScope::Nacional, "SENADORES", &ags, 91.0, &fotos(), "2025-10-26T21:00:00Z");
        let puestos: Vec<u32> = rows.iter().map(|r| r.puesto).collect();
        assert_eq!(puestos, vec![1, 2, 3]);
        assert_eq!(rows[0].agrupacion_id, "002");
        assert_eq!(rows[1].agrupacion_id, "003");
        assert_eq!(rows[2].agrupacion_id, "001");
        for r in &rows {
            assert_eq!(r.mesas_pct, "91.00");
        }
    }

    #[test]
    fn ties_keep_upstream_order() {
        let ags = agrupaciones(&[("001", "First", 10.0), ("002", "Second", 10.0)]);
        let rows = flatten_resultados(&AmbitoScope::Nacional, "DIPUTADOS", &ags, 50.0, &fotos(), "ts");
        assert_eq!(rows[0].agrupacion_id, "001");
        assert_eq!(rows[1].agrupacion_id, "002");
    }

    #[test]
    fn duplicate_groupings_are_dropped() {
        let ags = agrupaciones(&[
            ("001", "Lista A", 20.0),
            ("001", "Lista A bis", 15.0),
            ("002", "Lista B", 10.0),
        ]);
        let rows = flatten_resultados(&AmbitoScope::Nacional, "SENADORES", &ags, 10.0, &fotos(), "ts");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].puesto, 2);
    }

    #[test]
    fn two_grouping_payload_end_to_end() {
        let res: crate::models::Resultados = serde_json::from_value(json!({
            "valoresTotalizadosPositivos": [
                {"idAgrupacion": "10", "nombreAgrupacion": "Frente Uno", "votosPorcentaje": 30.00},
                {"idAgrupacion": "20", "nombreAgrupacion": "Frente Dos", "votosPorcentaje": 40.00},
            ],
            "estadoRecuento": {"mesasTotalizadasPorcentaje": 72.5},
        }))
        .unwrap();
        let ts = "2025-10-26T21:30:00Z";
        let rows = flatten_resultados(
            &AmbitoScope::Nacional,
            &abbrev_categoria("Senadores Nacionales"),
            &res.valores_totalizados_positivos,
            res.mesas_pct().unwrap(),
            &fotos(),
            ts,
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].puesto, 1);
        assert_eq!(rows[0].votos_pct, "40.00");
        assert_eq!(rows[1].puesto, 2);
        assert_eq!(rows[1].votos_pct, "30.00");
        assert!(rows.iter().all(|r| r.ts_iso == ts));
        assert!(rows.iter().all(|r| r.categoria == "SENADORES"));
    }

    #[test]
    fn provincia_scope_fills_identity_columns() {
        let ags = agrupaciones(&[("001", "Lista A", 55.0)]);
        let scope = AmbitoScope::Provincia {
            id: "04".into(),
            nombre: "Córdoba".into(),
        };
        let rows = flatten_resultados(&scope, "DIPUTADOS", &ags, 99.9, &fotos(), "ts");
        assert_eq!(rows[0].ambito, "PROVINCIA");
        assert_eq!(rows[0].ambito_id, "04");
        assert_eq!(rows[0].provincia, "Córdoba");
    }

    #[test]
    fn validation_flags_percentage_overflow() {
        let ags = agrupaciones(&[("001", "A", 60.0), ("002", "B", 45.0)]);
        let rows = flatten_resultados(&AmbitoScope::Nacional, "SENADORES", &ags, 10.0, &fotos(), "ts");
        let warnings = validate_group("NACIONAL|AR|SENADORES", &rows);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("exceeds 100"));
    }

    #[test]
    fn validation_passes_a_clean_group() {
        let ags = agrupaciones(&[("001", "A", 60.0), ("002", "B", 40.0)]);
        let rows = flatten_resultados(&AmbitoScope::Nacional, "SENADORES", &ags, 10.0, &fotos(), "ts");
        assert!(validate_group("NACIONAL|AR|SENADORES", &rows).is_empty());
    }
}
