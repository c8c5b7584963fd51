use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One CSV row: a political grouping's standing within an ambito/categoria,
/// stamped with the cycle timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct ResultRow {
    pub ambito: String,
    pub ambito_id: String,
    pub provincia: String,
    pub categoria: String,
    pub puesto: u32,
    pub agrupacion_id: String,
    pub agrupacion: String,
    pub votos_pct: String,
    pub mesas_pct: String,
    pub foto: String,
    pub ts_iso: String,
}

/// Aggregation scope a row set belongs to: the national total, the
/// Provincia de Buenos Aires cut, or any other provincial district.
#[derive(Debug, Clone)]
pub enum AmbitoScope {
    Nacional,
    Pba { distrito_id: String, nombre: String },
    Provincia { id: String, nombre: String },
}

impl AmbitoScope {
    pub fn ambito(&self) -> &str {
        match self {
            AmbitoScope::Nacional => "NACIONAL",
            AmbitoScope::Pba { .. } => "PBA",
            AmbitoScope::Provincia { .. } => "PROVINCIA",
        }
    }

    pub fn ambito_id(&self) -> &str {
        match self {
            AmbitoScope::Nacional => "AR",
            AmbitoScope::Pba { .. } => "PBA",
            AmbitoScope::Provincia { id, .. } => id,
        }
    }

    pub fn provincia(&self) -> &str {
        match self {
            AmbitoScope::Nacional => "",
            AmbitoScope::Pba { nombre, .. } => nombre,
            AmbitoScope::Provincia { nombre, .. } => nombre,
        }
    }

    /// The distritoId query parameter for this scope; the national total
    /// is requested without one.
    pub fn distrito_id(&self) -> Option<&str> {
        match self {
            AmbitoScope::Nacional => None,
            AmbitoScope::Pba { distrito_id, .. } => Some(distrito_id),
            AmbitoScope::Provincia { id, .. } => Some(id),
        }
    }
}

// -------------------------------------------------------------------------
// Upstream payloads. Deserialization is deliberately lenient: every field is
// optional and ids may arrive as numbers or strings, so shape drift surfaces
// as a DataShape error or a skipped item instead of a panic.
// -------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Categoria {
    #[serde(rename = "categoriaId")]
    pub categoria_id: Option<i64>,
    pub nombre: Option<String>,
}

/// getCategorias answers either a bare list or `{"categorias": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CategoriasPayload {
    Lista(Vec<Categoria>),
    Envuelta { categorias: Vec<Categoria> },
}

impl CategoriasPayload {
    pub fn into_vec(self) -> Vec<Categoria> {
        match self {
            CategoriasPayload::Lista(v) => v,
            CategoriasPayload::Envuelta { categorias } => categorias,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodigoAmbitos {
    #[serde(rename = "distritoId")]
    pub distrito_id: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogoAmbito {
    pub nombre: Option<String>,
    #[serde(rename = "nivelId")]
    pub nivel_id: Option<i64>,
    #[serde(rename = "codigoAmbitos")]
    pub codigo_ambitos: Option<CodigoAmbitos>,
}

impl CatalogoAmbito {
    pub fn distrito_id(&self) -> Option<String> {
        self.codigo_ambitos
            .as_ref()
            .and_then(|c| c.distrito_id.as_ref())
            .and_then(value_as_string)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CatalogoPayload {
    Lista(Vec<CatalogoAmbito>),
    Envuelta { ambitos: Vec<CatalogoAmbito> },
}

impl CatalogoPayload {
    pub fn into_vec(self) -> Vec<CatalogoAmbito> {
        match self {
            CatalogoPayload::Lista(v) => v,
            CatalogoPayload::Envuelta { ambitos } => ambitos,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Agrupacion {
    #[serde(rename = "idAgrupacion")]
    pub id_agrupacion: Option<Value>,
    #[serde(rename = "nombreAgrupacion")]
    pub nombre_agrupacion: Option<String>,
    pub nombre: Option<String>,
    #[serde(rename = "votosPorcentaje")]
    pub votos_porcentaje: Option<f64>,
    #[serde(rename = "porcentajeVotos")]
    pub porcentaje_votos: Option<f64>,
}

impl Agrupacion {
    pub fn id(&self) -> String {
        self.id_agrupacion
            .as_ref()
            .and_then(value_as_string)
            .unwrap_or_default()
    }

    pub fn nombre(&self) -> String {
        self.nombre_agrupacion
            .as_deref()
            .or(self.nombre.as_deref())
            .unwrap_or("")
            .trim()
            .to_string()
    }

    /// The upstream has used both spellings for the vote percentage.
    pub fn pct(&self) -> f64 {
        self.votos_porcentaje
            .or(self.porcentaje_votos)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EstadoRecuento {
    #[serde(rename = "mesasTotalizadasPorcentaje")]
    pub mesas_totalizadas_porcentaje: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Resultados {
    #[serde(rename = "valoresTotalizadosPositivos", default)]
    pub valores_totalizados_positivos: Vec<Agrupacion>,
    #[serde(rename = "estadoRecuento")]
    pub estado_recuento: Option<EstadoRecuento>,
}

impl Resultados {
    pub fn mesas_pct(&self) -> Option<f64> {
        self.estado_recuento
            .as_ref()
            .and_then(|e| e.mesas_totalizadas_porcentaje)
    }
}

/// estadoRecuento answers either `{"estadoRecuento": {...}}` or the inner
/// object directly.
#[derive(Debug, Clone, Deserialize)]
pub struct EstadoPayload {
    #[serde(rename = "estadoRecuento")]
    pub estado_recuento: Option<EstadoRecuento>,
    #[serde(rename = "mesasTotalizadasPorcentaje")]
    pub mesas_totalizadas_porcentaje: Option<f64>,
}

impl EstadoPayload {
    pub fn mesas_pct(&self) -> Option<f64> {
        self.estado_recuento
            .as_ref()
            .and_then(|e| e.mesas_totalizadas_porcentaje)
            .or(self.mesas_totalizadas_porcentaje)
    }
}

/// Ids arrive as numbers or strings depending on the endpoint.
pub fn value_as_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                Some(s.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Display name for a category: the broadcast tool expects the short forms.
pub fn abbrev_categoria(nombre: &str) -> String {
    let upper = nombre.to_uppercase();
    if upper.contains("SENADOR") {
        "SENADORES".to_string()
    } else if upper.contains("DIPUTADO") {
        "DIPUTADOS".to_string()
    } else {
        nombre.to_string()
    }
}
