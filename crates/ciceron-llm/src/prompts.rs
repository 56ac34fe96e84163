//! Prompt templates.

use ciceron_core::{Country, IntentLabel, Topic, Turn};

pub(crate) const REWRITE_SYSTEM: &str = "\
Eres un experto en recuperación de información para una guía turística de España y Japón. \
Reescribe la última consulta del viajero como una única consulta de búsqueda autocontenida: \
resuelve referencias a la conversación previa (\"allí\", \"ese sitio\"), corrige abreviaturas, \
elimina ruido y conserva los nombres propios. Responde en el idioma del viajero, \
con una sola línea, sin explicaciones ni comillas.";

pub(crate) const CLASSIFY_SYSTEM: &str = "\
Clasifica consultas turísticas. Responde SOLO con una etiqueta de la lista, sin nada más. \
Usa un país solo si la consulta se refiere claramente a ese país; si menciona los dos o \
ninguno, no uses país. Usa un tema solo si es inequívoco.";

pub(crate) const ANSWER_SYSTEM: &str = "\
Eres Cicerón, un guía turístico experto, amable y directo, especializado en España y Japón.
Respondes las dudas de los viajeros basándote EXCLUSIVAMENTE en el contexto proporcionado.

Estilo:
1. Habla con naturalidad, como una persona. No digas \"según el texto\" ni \"el documento dice\".
2. Sé conciso y ve al grano.
3. Usa **negritas** para lugares, horarios y precios importantes.

Contenido:
1. Usa SOLO la información del contexto. No inventes nada.
2. Si la respuesta no está en el contexto, no adivines ni uses conocimiento general: \
di que tus fuentes actuales no tienen esa información.
3. Si el contexto ofrece varias opciones, menciónalas todas.";

/// Render recent turns as a transcript for single-message prompts.
pub(crate) fn transcript(history: &[Turn]) -> String {
    history
        .iter()
        .map(|turn| format!("{}: {}", turn.role.as_str(), turn.text))
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn rewrite_user(query: &str, history: &[Turn]) -> String {
    if history.is_empty() {
        format!("Consulta: {}", query)
    } else {
        format!(
            "Conversación previa:\n{}\n\nConsulta: {}",
            transcript(history),
            query
        )
    }
}

/// Every label string the classifier may answer with.
pub(crate) fn label_vocabulary() -> Vec<String> {
    let mut labels = vec![IntentLabel::UNSPECIFIED.to_string()];
    for country in Country::ALL {
        labels.push(IntentLabel::country(country).to_string());
    }
    for topic in Topic::ALL {
        labels.push(
            IntentLabel {
                country: None,
                topic: Some(topic),
            }
            .to_string(),
        );
    }
    for country in Country::ALL {
        for topic in Topic::ALL {
            labels.push(IntentLabel::country(country).with_topic(topic).to_string());
        }
    }
    labels
}

pub(crate) fn classify_user(query: &str) -> String {
    format!(
        "Etiquetas: {}\n\nConsulta: {}",
        label_vocabulary().join(", "),
        query
    )
}

pub(crate) fn answer_user(query: &str, context: &str) -> String {
    format!("Pregunta del viajero: {}\n\nContexto:\n{}", query, context)
}
