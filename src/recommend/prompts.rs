//! Prompt templates (Portuguese, matching the catalog language).

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::{CandidateSet, SearchQuery};
use crate::catalog::CourseId;

const QUERY_PLANNER_PROMPT: &str = r#"Você transforma pedidos de treinamento em consultas de busca semântica sobre um catálogo de cursos.

As consultas serão comparadas com:
- a descrição dos cursos (o que oferecem)
- os objetivos (o que o aluno vai aprender)
- o público-alvo (para quem o curso é indicado)
- o conteúdo e os módulos (tópicos e habilidades)

Busque por competências e conceitos, não apenas pelo nome do aplicativo.

Regras:
1. Pedido simples e direto: gere UMA consulta centrada no objetivo do usuário.
2. Pedido com várias facetas: divida em no máximo 3 consultas, uma por conceito ou habilidade.
3. Use termos que apareceriam em descrições, objetivos e módulos de cursos.
4. Prefira substantivos e verbos que descrevem tarefas e competências.
5. Versão ou nível podem aparecer, mas nunca como foco da consulta.

Bons exemplos:
- "Preciso montar relatórios gerenciais" -> ["relatórios com tabelas dinâmicas", "gráficos e painéis de indicadores"]
- "Quero organizar os dados de clientes" -> ["modelagem de banco de dados relacional", "cadastro e consulta de registros"]

Evite consultas como "Excel" (genérica demais) ou "Access 2013" (presa à versão e não ao objetivo).

Responda somente com JSON no formato {"queries": ["..."]}.

Consultas anteriores:
{prior_queries}

Horário do sistema: {system_time}"#;

const SYNTHESIS_SYSTEM_PROMPT: &str = r#"Você é um orientador educacional que monta trilhas de aprendizado a partir de um catálogo de cursos.

Regra principal: escolha SOMENTE cursos da lista "CURSOS DISPONÍVEIS", identificados pelo course_id informado. Nunca invente cursos nem ids.

Para montar a trilha:
1. Seleção: escolha os cursos relevantes para o objetivo do usuário.
2. Ordenação: do fundamental ao avançado; cada curso prepara o seguinte.
3. Análise: para cada curso escolhido informe
   - path_position: posição na trilha (1, 2, 3, ...)
   - rationale: por que o curso ocupa essa posição (2 a 3 frases, cite pré-requisitos e continuidade)
   - comment: como o curso ajuda o usuário, citando módulos e habilidades concretas (2 a 4 frases)
4. path_summary: visão geral da progressão em 2 a 3 frases.

Prefira qualidade a quantidade. Se houver poucos cursos disponíveis, trabalhe apenas com eles.

Responda somente com JSON no formato {"recommendations": [{"course_id": 0, "path_position": 1, "rationale": "...", "comment": "..."}], "path_summary": "..."}."#;

pub fn render_query_planner_prompt(prior_queries: &[SearchQuery], now: DateTime<Utc>) -> String {
    let prior = if prior_queries.is_empty() {
        "None".to_string()
    } else {
        format!("- {}", prior_queries.join("\n- "))
    };
    QUERY_PLANNER_PROMPT
        .replace("{prior_queries}", &prior)
        .replace("{system_time}", &now.to_rfc3339())
}

pub fn synthesis_system_prompt() -> &'static str {
    SYNTHESIS_SYSTEM_PROMPT
}

/// Compact course summary shown to the synthesis model.
#[derive(Debug, Serialize)]
struct CandidateSummary<'a> {
    course_id: CourseId,
    title: &'a str,
    app: &'a str,
    level: &'a str,
    version: &'a str,
    duration: &'a str,
    short_description: &'a str,
    objectives: &'a str,
    audience: &'a str,
    prerequisites: &'a str,
    modalities: &'a [String],
    modules: Vec<&'a str>,
    similarity_score: f32,
}

pub fn render_synthesis_prompt(
    candidates: &CandidateSet,
    user_message: &str,
    max_recommendations: usize,
) -> String {
    let summaries: Vec<CandidateSummary<'_>> = candidates
        .documents()
        .iter()
        .map(|doc| {
            let course = &doc.snapshot;
            let mut modules: Vec<_> = course.modules.iter().collect();
            modules.sort_by_key(|module| module.order);
            CandidateSummary {
                course_id: doc.course_id,
                title: &course.title,
                app: &course.app,
                level: &course.level,
                version: &course.version,
                duration: &course.duration,
                short_description: &course.short_description,
                objectives: &course.objectives,
                audience: &course.audience,
                prerequisites: &course.prerequisites,
                modalities: &course.modalities,
                modules: modules.iter().map(|module| module.title.as_str()).collect(),
                similarity_score: doc.similarity_score,
            }
        })
        .collect();
    let catalog = serde_json::to_string_pretty(&summaries).unwrap_or_else(|_| "[]".to_string());

    format!(
        "Analise TODOS os cursos abaixo e monte a trilha para o usuário.\n\
         \n\
         Selecione no máximo {max} cursos, usando apenas os course_id listados.\n\
         \n\
         CURSOS DISPONÍVEIS:\n\
         {catalog}\n\
         \n\
         MENSAGEM DO USUÁRIO:\n\
         {message}\n\
         \n\
         Lembre-se: use APENAS course_id da lista CURSOS DISPONÍVEIS.",
        max = max_recommendations,
        catalog = catalog,
        message = user_message.trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CourseModule, CourseRecord};
    use crate::recommend::types::ScoredDocument;
    use chrono::TimeZone;

    #[test]
    fn planner_prompt_marks_missing_prior_queries() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let prompt = render_query_planner_prompt(&[], now);
        assert!(prompt.contains("Consultas anteriores:\nNone"));
        assert!(prompt.contains("2026-03-01T12:00:00+00:00"));

        let prompt = render_query_planner_prompt(&["fórmulas".to_string(), "gráficos".to_string()], now);
        assert!(prompt.contains("- fórmulas\n- gráficos"));
    }

    #[test]
    fn synthesis_prompt_lists_candidates_with_module_titles() {
        let mut candidates = CandidateSet::new();
        candidates.push_first_seen(ScoredDocument {
            course_id: 5,
            text: String::new(),
            snapshot: CourseRecord {
                id: 5,
                title: "Excel Intermediário".to_string(),
                app: "Excel".to_string(),
                level: "Intermediário".to_string(),
                version: "365".to_string(),
                duration: "16h".to_string(),
                short_description: "Funções e tabelas dinâmicas".to_string(),
                objectives: String::new(),
                audience: String::new(),
                prerequisites: String::new(),
                syllabus: "não enviado".to_string(),
                active: true,
                modalities: vec!["Online".to_string()],
                modules: vec![
                    CourseModule {
                        title: "Tabelas dinâmicas".to_string(),
                        description: String::new(),
                        order: 2,
                    },
                    CourseModule {
                        title: "PROCV".to_string(),
                        description: String::new(),
                        order: 1,
                    },
                ],
            },
            similarity_score: 0.82,
        });

        let prompt = render_synthesis_prompt(&candidates, "  quero relatórios  ", 8);
        assert!(prompt.contains("no máximo 8 cursos"));
        assert!(prompt.contains("\"course_id\": 5"));
        assert!(prompt.contains("\"modules\": [\n      \"PROCV\",\n      \"Tabelas dinâmicas\"\n    ]"));
        assert!(prompt.contains("MENSAGEM DO USUÁRIO:\nquero relatórios\n"));
        assert!(!prompt.contains("não enviado"));
    }
}
