use crate::api::{ApiClient, ApiError};
use crate::config::Config;
use crate::fotos::Fotos;
use crate::guard::HighWater;
use crate::models::{abbrev_categoria, AmbitoScope, Categoria, CatalogoAmbito, ResultRow};
use crate::output::{self, CycleLog};
use crate::rows;
use log::{error, info, warn};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};

/// Catalog ambitos below province level are not polled.
const NIVEL_PROVINCIA: i64 = 10;

const LOGS_DIR: &str = "logs";

/// Everything one cycle needs, owned by the loop task. No globals: the token
/// cache lives in the client, the catalog cache and high-water table here.
pub struct FeedContext {
    pub config: Config,
    pub client: ApiClient,
    pub fotos: Fotos,
    pub high_water: HighWater,
    catalog_cache: HashMap<i64, Catalogo>,
}

#[derive(Debug, Clone)]
struct Catalogo {
    pba_id: Option<String>,
    distritos: Vec<Distrito>,
}

#[derive(Debug, Clone)]
struct Distrito {
    id: String,
    nombre: String,
}

impl Catalogo {
    /// Keep province-level entries, dedup by district id, and spot PBA by
    /// its configured id or display name.
    fn from_ambitos(ambitos: &[CatalogoAmbito], config: &Config) -> Self {
        let pba_name = config.pba_name.trim().to_lowercase();
        let mut pba_id = None;
        let mut distritos = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for ambito in ambitos {
            if ambito.nivel_id != Some(NIVEL_PROVINCIA) {
                continue;
            }
            let Some(id) = ambito.distrito_id() else {
                continue;
            };
            if !seen.insert(id.clone()) {
                continue;
            }
            let nombre = ambito.nombre.clone().unwrap_or_default();
            if id == config.pba_id || nombre.trim().to_lowercase() == pba_name {
                pba_id = Some(id.clone());
            }
            distritos.push(Distrito { id, nombre });
        }
        Self { pba_id, distritos }
    }
}

impl FeedContext {
    pub fn new(config: Config, client: ApiClient, fotos: Fotos) -> Self {
        Self {
            config,
            client,
            fotos,
            high_water: HighWater::new(),
            catalog_cache: HashMap::new(),
        }
    }

    /// Catalog per category, fetched once and cached for the process
    /// lifetime; district lists do not change mid-election.
    async fn catalogo_for(&mut self, categoria_id: i64) -> Result<Catalogo, ApiError> {
        if let Some(cached) = self.catalog_cache.get(&categoria_id) {
            return Ok(cached.clone());
        }
        let ambitos = self.client.get_catalogo(categoria_id).await?;
        let catalogo = Catalogo::from_ambitos(&ambitos, &self.config);
        info!(
            "catalogo for categoria {categoria_id}: {} districts, pba={:?}",
            catalogo.distritos.len(),
            catalogo.pba_id
        );
        self.catalog_cache.insert(categoria_id, catalogo.clone());
        Ok(catalogo)
    }
}

/// SENADORES and DIPUTADOS are the categories the broadcast cares about.
fn resolve_target_categorias(categorias: &[Categoria]) -> Vec<(i64, String)> {
    let mut targets: Vec<(i64, String)> = Vec::new();
    for c in categorias {
        let (Some(id), Some(nombre)) = (c.categoria_id, c.nombre.as_deref()) else {
            continue;
        };
        let display = abbrev_categoria(nombre);
        if display != "SENADORES" && display != "DIPUTADOS" {
            continue;
        }
        // Last match wins when a name repeats, matching the upstream catalog
        // order.
        match targets.iter_mut().find(|(_, d)| *d == display) {
            Some(entry) => entry.0 = id,
            None => targets.push((id, display)),
        }
    }
    targets
}

/// Shape-level problems skip the affected category/ambito; everything else
/// aborts the cycle and the stale CSV stands until the next interval.
fn is_skippable(e: &ApiError) -> bool {
    matches!(e, ApiError::DataShape { .. })
}

/// Runs until the process dies. Returns early only when startup itself fails
/// (no categories) or there is nothing to feed.
pub async fn run_feed_loop(mut ctx: FeedContext) -> Result<(), ApiError> {
    let (categorias, raw) = ctx.client.get_categorias().await?;
    if let Err(e) = output::dump_categorias(&raw, Path::new(LOGS_DIR)) {
        warn!("could not write categorias.log: {e}");
    }
    let targets = resolve_target_categorias(&categorias);
    if targets.is_empty() {
        info!("no SENADORES/DIPUTADOS categories in the catalog; nothing to do");
        return Ok(());
    }
    info!(
        "feeding {} categories every {}s into {}",
        targets.len(),
        ctx.config.interval_seconds,
        ctx.config.csv_path.display()
    );

    let mut ticker = feed_ticker(Duration::from_secs(ctx.config.interval_seconds));
    loop {
        ticker.tick().await;
        let ts = output::now_iso();
        let mut cycle = CycleLog::new(&ts);

        match run_cycle(&mut ctx, &targets, &ts, &mut cycle).await {
            Ok(rows) if rows.is_empty() => {
                cycle.push("skip write: no rows this cycle".to_string());
            }
            Ok(rows) => {
                if let Err(e) = output::write_csv_atomic(&rows, &ctx.config.csv_path) {
                    cycle.push(format!("csv write failed: {e}"));
                } else {
                    info!("wrote {} rows, ambitos_ok={}", rows.len(), cycle.ambitos_ok);
                }
            }
            Err(e) => {
                error!("cycle aborted: {e}");
            }
        }

        if let Err(e) = cycle.append_to(Path::new(LOGS_DIR)) {
            warn!("could not append run.log: {e}");
        }
    }
}

/// A cycle that outruns the interval must still be followed by a full sleep;
/// letting queued ticks fire back-to-back would eat into the upstream
/// request budget after a stall.
fn feed_ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// One fetch-flatten-write pass over every (categoria, ambito) combination.
/// Err means the cycle is aborted wholesale (auth/transport trouble); the
/// caller leaves the CSV untouched.
async fn run_cycle(
    ctx: &mut FeedContext,
    targets: &[(i64, String)],
    ts: &str,
    cycle: &mut CycleLog,
) -> Result<Vec<ResultRow>, ApiError> {
    let mut all_rows = Vec::new();
    for (cid, cname) in targets {
        let catalogo = match ctx.catalogo_for(*cid).await {
            Ok(c) => c,
            Err(e) if is_skippable(&e) => {
                cycle.push(format!("catalogo categoria {cid}: {e}"));
                continue;
            }
            Err(e) => {
                cycle.push(format!("cycle aborted at catalogo categoria {cid}: {e}"));
                return Err(e);
            }
        };

        let mut scopes = vec![AmbitoScope::Nacional];
        if let Some(pba_id) = &catalogo.pba_id {
            scopes.push(AmbitoScope::Pba {
                distrito_id: pba_id.clone(),
                nombre: ctx.config.pba_name.clone(),
            });
        }
        for d in &catalogo.distritos {
            scopes.push(AmbitoScope::Provincia {
                id: d.id.clone(),
                nombre: d.nombre.clone(),
            });
        }

        for scope in &scopes {
            match fetch_scope_rows(ctx, *cid, cname, scope, ts).await {
                Ok(scope_rows) if scope_rows.is_empty() => {
                    cycle.push(format!(
                        "empty resultados {} categoria {cid}",
                        scope.ambito_id()
                    ));
                }
                Ok(mut scope_rows) => {
                    let key = format!("{}|{}|{cname}", scope.ambito(), scope.ambito_id());
                    for w in rows::validate_group(&key, &scope_rows) {
                        cycle.push(format!("warn {w}"));
                    }
                    all_rows.append(&mut scope_rows);
                    cycle.ambitos_ok += 1;
                }
                Err(e) if is_skippable(&e) => {
                    cycle.push(format!(
                        "resultados {} categoria {cid}: {e}",
                        scope.ambito_id()
                    ));
                }
                Err(e) => {
                    cycle.push(format!(
                        "cycle aborted at {} categoria {cid}: {e}",
                        scope.ambito_id()
                    ));
                    return Err(e);
                }
            }
        }
    }
    Ok(all_rows)
}

/// Results for one scope: fetch, fill in mesas_pct (with the estadoRecuento
/// fallback when the results payload lacks it), run the high-water guard,
/// flatten.
async fn fetch_scope_rows(
    ctx: &mut FeedContext,
    categoria_id: i64,
    categoria: &str,
    scope: &AmbitoScope,
    ts: &str,
) -> Result<Vec<ResultRow>, ApiError> {
    let distrito = scope.distrito_id();
    let res = ctx.client.get_resultados(categoria_id, distrito).await?;

    let mut mesas = res.mesas_pct().unwrap_or(0.0);
    if mesas <= 0.0 {
        match ctx.client.get_estado_recuento(categoria_id, distrito).await {
            Ok(Some(pct)) => mesas = pct,
            Ok(None) => {}
            Err(e) => {
                warn!("estadoRecuento fallback failed for categoria {categoria_id} distrito {distrito:?}: {e}");
            }
        }
    }

    let mesas = ctx.high_water.enforce(scope.ambito_id(), categoria, mesas);
    Ok(rows::flatten_resultados(
        scope,
        categoria,
        &res.valores_totalizados_positivos,
        mesas,
        &ctx.fotos,
        ts,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn test_config() -> Config {
        Config {
            base_url: "http://localhost".to_string(),
            token: Some("t".to_string()),
            username: None,
            password: None,
            interval_seconds: 30,
            pba_id: "02".to_string(),
            pba_name: "Provincia de Buenos Aires".to_string(),
            csv_path: PathBuf::from("out.csv"),
            fotos_base_path: String::new(),
            fotos_default_file: "N/A".to_string(),
            fotos_json_path: String::new(),
        }
    }

    #[test]
    fn resolves_senadores_and_diputados_only() {
        let categorias: Vec<Categoria> = serde_json::from_value(json!([
            {"categoriaId": 1, "nombre": "Presidente"},
            {"categoriaId": 2, "nombre": "Senadores Nacionales"},
            {"categoriaId": 3, "nombre": "Diputados Nacionales"},
            {"categoriaId": 4, "nombre": "Gobernador"},
        ]))
        .unwrap();
        let targets = resolve_target_categorias(&categorias);
        assert_eq!(
            targets,
            vec![(2, "SENADORES".to_string()), (3, "DIPUTADOS".to_string())]
        );
    }

    #[test]
    fn repeated_category_names_keep_the_last_id() {
        let categorias: Vec<Categoria> = serde_json::from_value(json!([
            {"categoriaId": 2, "nombre": "Senadores Nacionales"},
            {"categoriaId": 8, "nombre": "Senador Provincial"},
        ]))
        .unwrap();
        assert_eq!(
            resolve_target_categorias(&categorias),
            vec![(8, "SENADORES".to_string())]
        );
    }

    #[tokio::test]
    async fn overrunning_cycles_delay_the_next_tick() {
        let ticker = feed_ticker(Duration::from_secs(30));
        assert_eq!(ticker.missed_tick_behavior(), MissedTickBehavior::Delay);
    }

    #[test]
    fn empty_when_no_interesting_categories() {
        let categorias: Vec<Categoria> =
            serde_json::from_value(json!([{"categoriaId": 1, "nombre": "Presidente"}])).unwrap();
        assert!(resolve_target_categorias(&categorias).is_empty());
    }

    #[test]
    fn catalogo_filters_levels_dedups_and_finds_pba_by_id() {
        let ambitos: Vec<CatalogoAmbito> = serde_json::from_value(json!([
            {"nombre": "Argentina", "nivelId": 1, "codigoAmbitos": {"distritoId": "00"}},
            {"nombre": "Buenos Aires", "nivelId": 10, "codigoAmbitos": {"distritoId": "02"}},
            {"nombre": "Córdoba", "nivelId": 10, "codigoAmbitos": {"distritoId": "04"}},
            {"nombre": "Córdoba bis", "nivelId": 10, "codigoAmbitos": {"distritoId": "04"}},
            {"nombre": "Sin código", "nivelId": 10},
        ]))
        .unwrap();
        let catalogo = Catalogo::from_ambitos(&ambitos, &test_config());
        assert_eq!(catalogo.pba_id.as_deref(), Some("02"));
        let ids: Vec<&str> = catalogo.distritos.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["02", "04"]);
    }

    #[test]
    fn catalogo_finds_pba_by_name_when_id_differs() {
        let ambitos: Vec<CatalogoAmbito> = serde_json::from_value(json!([
            {"nombre": "provincia de buenos aires", "nivelId": 10, "codigoAmbitos": {"distritoId": "99"}},
        ]))
        .unwrap();
        let catalogo = Catalogo::from_ambitos(&ambitos, &test_config());
        assert_eq!(catalogo.pba_id.as_deref(), Some("99"));
    }

    #[test]
    fn data_shape_errors_are_skippable_transport_errors_are_not() {
        assert!(is_skippable(&ApiError::DataShape {
            endpoint: "/resultados/getResultados".to_string(),
            detail: "missing field".to_string(),
        }));
        assert!(!is_skippable(&ApiError::Http { status: 500 }));
        assert!(!is_skippable(&ApiError::Network("timeout".to_string())));
        assert!(!is_skippable(&ApiError::Auth("refresh failed".to_string())));
    }
}
