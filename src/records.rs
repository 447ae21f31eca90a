//! Structured incident records and the per-category record store.
//!
//! A record is one wiki page after field extraction. Records are stored flat
//! on disk: `id`, `title`, `created`, `content` plus one top-level key per
//! extracted field, e.g.
//!
//! ```json
//! {"id": "9251", "title": "INC-1 error en cuota", "content": "...",
//!  "número del incidente": "INC-1", "causa raíz": "..."}
//! ```

use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use std::{collections::BTreeMap, fmt, path::Path, str::FromStr};

/// One of the four independent document domains.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Incidents,
    Solicitudes,
    Causaraiz,
    Postmortem,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Incidents,
        Category::Solicitudes,
        Category::Causaraiz,
        Category::Postmortem,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            Category::Incidents => "incidents",
            Category::Solicitudes => "solicitudes",
            Category::Causaraiz => "causaraiz",
            Category::Postmortem => "postmortem",
        }
    }

    /// HTTP route serving this category.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Category::Incidents => "/search_incident",
            Category::Solicitudes => "/search_solicitudes",
            Category::Causaraiz => "/search_causaraiz",
            Category::Postmortem => "/search_postmortem",
        }
    }

    /// Pages as fetched from the wiki, before field extraction.
    pub fn raw_file(&self) -> String {
        format!("{}_raw.json", self.slug())
    }

    /// Records after field extraction, input of the vectorize step.
    pub fn normalized_file(&self) -> String {
        format!("{}_normalized.json", self.slug())
    }

    /// Records paired 1:1 with the rows of `vectors_file`.
    pub fn records_file(&self) -> String {
        format!("{}.records.json", self.slug())
    }

    pub fn vectors_file(&self) -> String {
        format!("{}.vectors.bin", self.slug())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.slug() == s.trim().to_lowercase())
            .ok_or_else(|| format!("unknown category '{s}'"))
    }
}

/// Named fields produced by field extraction.
///
/// The extractor recognises the same label set in every category, so any
/// record may carry any of these keys. `Status` is only ever set on
/// causaraiz records (derived from the page title).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKey {
    DescripcionDelProblema,
    AnalisisYAccionesTomadas,
    ResultadoDelReprocesamiento,
    ValidacionYCierre,
    SolucionAplicada,
    CodigoProporcionado,
    SistemaRelacionado,
    FlujoRelacionado,
    Solucion,
    CausaRaizRelacionada,
    TipoSolucion,
    NotasAdicionales,
    CasoRelacionado,
    Causa,
    ProximosPasos,
    TareasAsignadas,
    Propietario,
    Fecha,
    IdentificacionDelProblema,
    ConsultasRealizadas,
    EtiquetasSolucion,
    Resultado,
    CodigoUsado,
    ScriptSql,
    ProcedimientoAlmacenado,
    Query,
    SentenciaSql,
    ConsultaSql,
    Transaccion,
    EjemploDeCodigo,
    EjemploDeConsulta,
    EjecucionDeQuery,
    ConsultaEnBaseDeDatos,
    EjecucionManual,
    ProcedimientoEjecutado,
    QueryUsado,
    ConsultaUtilizada,
    EjemploDeQuery,
    TituloDelIncidente,
    IncidentNumber,
    DescripcionDelIncidente,
    AnalisisDelIncidente,
    DetalleTecnico,
    SolucionTecnica,
    CausaRaiz,
    CausaNegocio,
    SolucionNegocio,
    Afectacion,
    FechaDeHoy,
    Status,
}

impl FieldKey {
    /// Labels searched for in page text, in matching priority order.
    pub const EXTRACTABLE: [FieldKey; 49] = [
        FieldKey::DescripcionDelProblema,
        FieldKey::AnalisisYAccionesTomadas,
        FieldKey::ResultadoDelReprocesamiento,
        FieldKey::ValidacionYCierre,
        FieldKey::SolucionAplicada,
        FieldKey::CodigoProporcionado,
        FieldKey::SistemaRelacionado,
        FieldKey::FlujoRelacionado,
        FieldKey::Solucion,
        FieldKey::CausaRaizRelacionada,
        FieldKey::TipoSolucion,
        FieldKey::NotasAdicionales,
        FieldKey::CasoRelacionado,
        FieldKey::Causa,
        FieldKey::ProximosPasos,
        FieldKey::TareasAsignadas,
        FieldKey::Propietario,
        FieldKey::Fecha,
        FieldKey::IdentificacionDelProblema,
        FieldKey::ConsultasRealizadas,
        FieldKey::EtiquetasSolucion,
        FieldKey::Resultado,
        FieldKey::CodigoUsado,
        FieldKey::ScriptSql,
        FieldKey::ProcedimientoAlmacenado,
        FieldKey::Query,
        FieldKey::SentenciaSql,
        FieldKey::ConsultaSql,
        FieldKey::Transaccion,
        FieldKey::EjemploDeCodigo,
        FieldKey::EjemploDeConsulta,
        FieldKey::EjecucionDeQuery,
        FieldKey::ConsultaEnBaseDeDatos,
        FieldKey::EjecucionManual,
        FieldKey::ProcedimientoEjecutado,
        FieldKey::QueryUsado,
        FieldKey::ConsultaUtilizada,
        FieldKey::EjemploDeQuery,
        FieldKey::TituloDelIncidente,
        FieldKey::IncidentNumber,
        FieldKey::DescripcionDelIncidente,
        FieldKey::AnalisisDelIncidente,
        FieldKey::DetalleTecnico,
        FieldKey::SolucionTecnica,
        FieldKey::CausaRaiz,
        FieldKey::CausaNegocio,
        FieldKey::SolucionNegocio,
        FieldKey::Afectacion,
        FieldKey::FechaDeHoy,
    ];

    /// Lowercase label, also the JSON key.
    pub fn label(&self) -> &'static str {
        match self {
            FieldKey::DescripcionDelProblema => "descripción del problema",
            FieldKey::AnalisisYAccionesTomadas => "análisis y acciones tomadas",
            FieldKey::ResultadoDelReprocesamiento => "resultado del reprocesamiento",
            FieldKey::ValidacionYCierre => "validación y cierre",
            FieldKey::SolucionAplicada => "solución aplicada",
            FieldKey::CodigoProporcionado => "código proporcionado",
            FieldKey::SistemaRelacionado => "sistema relacionado",
            FieldKey::FlujoRelacionado => "flujo relacionado",
            FieldKey::Solucion => "solución",
            FieldKey::CausaRaizRelacionada => "causa raíz relacionada",
            FieldKey::TipoSolucion => "tipo solución",
            FieldKey::NotasAdicionales => "notas adicionales",
            FieldKey::CasoRelacionado => "caso relacionado",
            FieldKey::Causa => "causa",
            FieldKey::ProximosPasos => "próximos pasos",
            FieldKey::TareasAsignadas => "tareas asignadas",
            FieldKey::Propietario => "propietario",
            FieldKey::Fecha => "fecha",
            FieldKey::IdentificacionDelProblema => "identificación del problema",
            FieldKey::ConsultasRealizadas => "consultas realizadas",
            FieldKey::EtiquetasSolucion => "etiquetas solución",
            FieldKey::Resultado => "resultado",
            FieldKey::CodigoUsado => "código usado",
            FieldKey::ScriptSql => "script sql",
            FieldKey::ProcedimientoAlmacenado => "procedimiento almacenado (sp)",
            FieldKey::Query => "query",
            FieldKey::SentenciaSql => "sentencia sql",
            FieldKey::ConsultaSql => "consulta sql",
            FieldKey::Transaccion => "transacción",
            FieldKey::EjemploDeCodigo => "ejemplo de código",
            FieldKey::EjemploDeConsulta => "ejemplo de consulta",
            FieldKey::EjecucionDeQuery => "ejecución de query",
            FieldKey::ConsultaEnBaseDeDatos => "consulta en base de datos",
            FieldKey::EjecucionManual => "ejecución manual",
            FieldKey::ProcedimientoEjecutado => "procedimiento ejecutado",
            FieldKey::QueryUsado => "query usado",
            FieldKey::ConsultaUtilizada => "consulta utilizada",
            FieldKey::EjemploDeQuery => "ejemplo de query",
            FieldKey::TituloDelIncidente => "título del incidente",
            FieldKey::IncidentNumber => "número del incidente",
            FieldKey::DescripcionDelIncidente => "descripción del incidente",
            FieldKey::AnalisisDelIncidente => "análisis del incidente",
            FieldKey::DetalleTecnico => "detalle técnico",
            FieldKey::SolucionTecnica => "solución técnica",
            FieldKey::CausaRaiz => "causa raíz",
            FieldKey::CausaNegocio => "causa negocio",
            FieldKey::SolucionNegocio => "solución negocio",
            FieldKey::Afectacion => "afectación",
            FieldKey::FechaDeHoy => "fecha de hoy",
            FieldKey::Status => "status",
        }
    }

    /// Fields holding code or SQL; their text is kept verbatim.
    ///
    /// `sentencia sql`, `consulta sql` and `procedimiento almacenado (sp)`
    /// are not in the list, so their values are cleaned like prose. Existing
    /// normalized dumps were produced that way.
    pub fn is_code(&self) -> bool {
        matches!(
            self,
            FieldKey::CodigoProporcionado
                | FieldKey::ScriptSql
                | FieldKey::Query
                | FieldKey::Transaccion
                | FieldKey::EjemploDeCodigo
                | FieldKey::EjemploDeConsulta
                | FieldKey::EjecucionDeQuery
                | FieldKey::ConsultaEnBaseDeDatos
                | FieldKey::EjecucionManual
                | FieldKey::ProcedimientoEjecutado
                | FieldKey::QueryUsado
                | FieldKey::ConsultaUtilizada
                | FieldKey::EjemploDeQuery
        )
    }

    /// Case-insensitive lookup by label.
    pub fn from_label(label: &str) -> Option<FieldKey> {
        let label = label.trim().to_lowercase();
        FieldKey::EXTRACTABLE
            .into_iter()
            .chain(std::iter::once(FieldKey::Status))
            .find(|key| key.label() == label)
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Extracted fields of a record, keyed by [`FieldKey`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields(BTreeMap<FieldKey, String>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: FieldKey) -> Option<&str> {
        self.0.get(&key).map(String::as_str)
    }

    pub fn insert(&mut self, key: FieldKey, value: impl Into<String>) -> Option<String> {
        self.0.insert(key, value.into())
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldKey, &str)> {
        self.0.iter().map(|(key, value)| (*key, value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(FieldKey, String)> for Fields {
    fn from_iter<T: IntoIterator<Item = (FieldKey, String)>>(iter: T) -> Self {
        Fields(iter.into_iter().collect())
    }
}

impl Serialize for Fields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key.label(), value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Fields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldsVisitor;

        impl<'de> Visitor<'de> for FieldsVisitor {
            type Value = Fields;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of extracted fields")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Fields, A::Error> {
                let mut fields = Fields::new();
                while let Some((name, value)) =
                    access.next_entry::<String, serde_json::Value>()?
                {
                    match (FieldKey::from_label(&name), value) {
                        (Some(key), serde_json::Value::String(value)) => {
                            fields.insert(key, value);
                        }
                        (key, _) => {
                            log::debug!("skipping record key {name:?} (known: {})", key.is_some());
                        }
                    }
                }
                Ok(fields)
            }
        }

        deserializer.deserialize_map(FieldsVisitor)
    }
}

/// A structured document belonging to exactly one category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Record {
    pub fn incident_number(&self) -> Option<&str> {
        self.fields.get(FieldKey::IncidentNumber)
    }
}

/// Ordered, read-only sequence of records for one category.
///
/// Position `i` of the store is row `i` of the paired vector index.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: Vec<Record>,
}

impl RecordStore {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read(path)?;
        let records: Vec<Record> = serde_json::from_slice(&data)?;
        Ok(Self { records })
    }

    pub fn get(&self, position: usize) -> Option<&Record> {
        self.records.get(position)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }
}
